use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Advisory locks keyed by study set id.
///
/// Mutating operations on one study set run one at a time; operations on
/// different study sets never wait on each other. Entries are dropped once
/// nobody holds or waits for them.
#[derive(Default)]
pub struct StudySetLocks {
    locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
}

pub struct StudySetGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
    study_set_id: u64,
}

impl StudySetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, study_set_id: u64) -> StudySetGuard {
        // Clone out of the map before awaiting so no shard lock is held.
        let lock = Arc::clone(
            self.locks
                .entry(study_set_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = lock.lock_owned().await;

        StudySetGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            study_set_id,
        }
    }

    /// Number of study sets with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for StudySetGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.study_set_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
