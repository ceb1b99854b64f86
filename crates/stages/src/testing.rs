//! Port doubles shared by the stage tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use relay::{
    BackendError, BackendInvoker, BackendRequest, BackendResponse, InsertOutcome, MessageId,
    NewRecord, OutboundMessage, PublishError, QueuePublisher, RecordStore, RecordUpdate,
    StoreError, StoredRecord,
};

/// Record store double that can be switched into an outage.
#[derive(Default)]
pub struct FakeStore {
    records: Mutex<HashMap<MessageId, StoredRecord>>,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
    writes: Mutex<Vec<&'static str>>,
}

impl FakeStore {
    pub fn record(&self, id: &MessageId) -> Option<StoredRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn writes(&self) -> Vec<&'static str> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn insert(&self, record: NewRecord) -> Result<InsertOutcome, StoreError> {
        self.writes.lock().unwrap().push("insert");
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "insert outage".to_string(),
            });
        }
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        records.insert(record.id.clone(), StoredRecord::from_new(record));
        Ok(InsertOutcome::Created)
    }

    async fn update(&self, id: &MessageId, update: RecordUpdate) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push("update");
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "update outage".to_string(),
            });
        }
        self.records
            .lock()
            .unwrap()
            .entry(id.clone())
            .and_modify(|record| record.apply(&update))
            .or_insert_with(|| StoredRecord::from_update(id.clone(), &update));
        Ok(())
    }
}

/// Backend double answering from a script, `200` once the script runs out.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<BackendResponse, BackendError>>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn answering(answers: Vec<Result<BackendResponse, BackendError>>) -> Self {
        Self {
            script: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn status(status: u16) -> Result<BackendResponse, BackendError> {
        Ok(BackendResponse {
            status,
            body: r#"{"msg":"Event received"}"#.to_string(),
        })
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendInvoker for ScriptedBackend {
    async fn forward(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Self::status(200))
    }
}

/// Publisher double that records messages or fails on demand.
#[derive(Default)]
pub struct FakePublisher {
    published: Mutex<Vec<OutboundMessage>>,
    pub fail: AtomicBool,
}

impl FakePublisher {
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueuePublisher for FakePublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable {
                message: "queue offline".to_string(),
            });
        }
        self.published.lock().unwrap().push(message);
        Ok(MessageId::random())
    }
}
