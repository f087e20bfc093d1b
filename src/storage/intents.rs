use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::IntentRecord;
use super::tables::*;

impl Database {
    /// Every intent still on record, oldest first
    pub fn list_intents(&self) -> Result<Vec<IntentRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(INTENTS)?;

        let mut intents = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            intents.push(rmp_serde::from_slice(value.value())?);
        }

        Ok(intents)
    }

    /// Record an intent in its own transaction
    pub fn record_intent(&self, intent: &IntentRecord) -> Result<(), DatabaseError> {
        self.write(|txn| put_intent(txn, intent))
    }

    /// Drop an intent in its own transaction
    pub fn clear_intent(&self, id: u64) -> Result<(), DatabaseError> {
        self.write(|txn| remove_intent(txn, id).map(|_| ()))
    }
}

/// Insert or overwrite an intent
pub fn put_intent(txn: &WriteTransaction, intent: &IntentRecord) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(INTENTS)?;
    let data = rmp_serde::to_vec_named(intent)?;
    table.insert(intent.id, data.as_slice())?;
    Ok(())
}

/// Remove an intent. Returns whether it existed.
pub fn remove_intent(txn: &WriteTransaction, id: u64) -> Result<bool, DatabaseError> {
    let mut table = txn.open_table(INTENTS)?;
    let removed = table.remove(id)?.is_some();
    Ok(removed)
}
