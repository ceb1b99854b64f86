//! Port traits for the relay's external collaborators.
//!
//! The relay stages depend only on these traits. Infrastructure crates
//! (`store`, `backend`, `queue`) provide the implementations, and the
//! composition root wires them together. All async traits use `async-trait`
//! so they stay dyn-compatible and can be held as `Arc<dyn Trait>`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    BackendError, BackendRequest, BackendResponse, GroupKey, InsertOutcome, MessageId,
    NewRecord, PublishError, RecordUpdate, StoreError, StoredRecord,
};

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Write side of the durable record store.
///
/// Callers treat every error as non-fatal: a store outage must never block
/// webhook relay.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates the record for `record.id` unless one already exists.
    async fn insert(&self, record: NewRecord) -> Result<InsertOutcome, StoreError>;

    /// Merges `update` into the record for `id`, creating it if missing.
    /// Last write wins.
    async fn update(&self, id: &MessageId, update: RecordUpdate) -> Result<(), StoreError>;
}

/// Read side of the record store. Used for verification, never by the relay.
#[async_trait]
pub trait RecordReader: Send + Sync {
    /// Returns the record for `id`, if any.
    async fn get(&self, id: &MessageId) -> Result<Option<StoredRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Sends one request to the downstream backend.
///
/// Implementations make exactly one attempt. Retrying is the queue's job:
/// redelivery re-runs the whole consumer state machine.
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    /// Returns the backend's response whatever its status, or
    /// [`BackendError`] when no response was obtained.
    async fn forward(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError>;
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// How the queue should treat a message identical to a recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deduplication {
    /// Byte-identical bodies within the dedup window collapse into the first
    /// publish.
    ContentBased,
    /// Every publish creates a message.
    Disabled,
}

/// A message ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Ordering group.
    pub group_key: GroupKey,
    /// Encoded envelope.
    pub body: String,
    /// Deduplication mode.
    pub deduplication: Deduplication,
}

/// One message handed to a consumer invocation by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    /// Identifier assigned at publish time.
    pub message_id: MessageId,
    /// Group the message was published under.
    pub group_key: GroupKey,
    /// Encoded envelope.
    pub body: String,
    /// How many times the message has been handed out, this delivery included.
    pub receive_count: u32,
}

/// Publishing side of the ordered queue.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publishes `message`, returning the identifier the queue assigned (or
    /// the identifier of the original message if it was deduplicated).
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, PublishError>;
}

// ---------------------------------------------------------------------------
// Error reporting
// ---------------------------------------------------------------------------

/// Which half of the relay raised an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStage {
    /// The ingestion handler.
    Publish,
    /// The relay consumer.
    Subscribe,
}

impl std::fmt::Display for RelayStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayStage::Publish => f.write_str("publish"),
            RelayStage::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// A failure worth a human's attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    /// Reporting stage.
    pub stage: RelayStage,
    /// Summary line.
    pub message: String,
    /// The message concerned, when known.
    pub message_id: Option<MessageId>,
    /// Additional context.
    pub extra: Map<String, Value>,
}

impl Incident {
    /// Starts an incident for `stage`.
    pub fn new(stage: RelayStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            message_id: None,
            extra: Map::new(),
        }
    }

    /// Attaches the message concerned.
    pub fn with_message_id(mut self, id: &MessageId) -> Self {
        self.message_id = Some(id.clone());
        self
    }

    /// Attaches one piece of context.
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Error-reporting side channel. Reporting never fails the caller.
pub trait ErrorReporter: Send + Sync {
    /// Records `incident`.
    fn report(&self, incident: Incident);
}
