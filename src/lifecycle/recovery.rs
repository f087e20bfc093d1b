use serde::Serialize;
use tracing::{info, warn};

use super::error::LifecycleError;
use super::manager::{StudySetManager, STAGING_DIR};
use crate::storage::models::IntentKind;

/// Outcome of a recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RecoveryReport {
    /// Intents fully reconciled and removed
    pub replayed: u64,
    /// Intents that could not be reconciled and remain on record
    pub pending: u64,
}

impl StudySetManager {
    /// Reconcile the file tree with every intent left behind by an
    /// interrupted operation, then empty the staging area.
    ///
    /// Must run before requests are served: staged files present at that
    /// point belong to no in-flight upload.
    pub async fn recover(&self) -> Result<RecoveryReport, LifecycleError> {
        let mut report = RecoveryReport::default();

        for intent in self.db.list_intents()? {
            let resolved = match &intent.kind {
                IntentKind::Place { .. } => self.undo_placement(&intent).await,
                IntentKind::Remove {
                    committed: false,
                    study_set_id,
                    file_id,
                    parked,
                } => match self.rows_remain(*study_set_id, *file_id) {
                    Ok(true) => self.restore_parked(intent.id, parked).await,
                    // A later removal took the rows, the parked copies are stale.
                    Ok(false) => self.purge_quietly(intent.id).await,
                    Err(e) => {
                        warn!(intent_id = intent.id, error = %e, "Failed to read rows");
                        false
                    }
                },
                IntentKind::Remove {
                    committed: true, ..
                } => self.purge_quietly(intent.id).await,
            };

            if resolved {
                self.db.clear_intent(intent.id)?;
                report.replayed += 1;
            } else {
                report.pending += 1;
            }
        }

        self.bounded(
            "clear staging area",
            self.files.delete_directory_recursive(STAGING_DIR),
        )
        .await?;

        if report.replayed > 0 || report.pending > 0 {
            info!(
                replayed = report.replayed,
                pending = report.pending,
                "Recovered interrupted operations"
            );
        }

        Ok(report)
    }

    /// Whether the rows a `Remove` intent was deleting are still present
    fn rows_remain(&self, study_set_id: u64, file_id: Option<u64>) -> Result<bool, LifecycleError> {
        let present = match file_id {
            Some(file_id) => self.db.get_study_set_file(file_id)?.is_some(),
            None => self.db.get_study_set(study_set_id)?.is_some(),
        };
        Ok(present)
    }

    async fn purge_quietly(&self, intent_id: u64) -> bool {
        match self.purge_trash(intent_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(intent_id, error = %e, "Failed to purge trash");
                false
            }
        }
    }
}
