use std::collections::HashMap;

use async_trait::async_trait;
use relay::{
    InsertOutcome, MessageId, NewRecord, RecordReader, RecordStore, RecordUpdate, StoreError,
    StoredRecord, TableName,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Record store held in process memory.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    table: TableName,
    records: RwLock<HashMap<MessageId, StoredRecord>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store for `table`.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` if no record has been written.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<InsertOutcome, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            debug!(table = %self.table, id = %record.id, "Record already present, insert skipped");
            return Ok(InsertOutcome::AlreadyPresent);
        }
        records.insert(record.id.clone(), StoredRecord::from_new(record));
        Ok(InsertOutcome::Created)
    }

    async fn update(&self, id: &MessageId, update: RecordUpdate) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .entry(id.clone())
            .and_modify(|record| record.apply(&update))
            .or_insert_with(|| StoredRecord::from_update(id.clone(), &update));
        Ok(())
    }
}

#[async_trait]
impl RecordReader for InMemoryRecordStore {
    async fn get(&self, id: &MessageId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
