//! Core domain of the webhook relay.
//!
//! This crate holds every relay concept: newtype identifiers, the queue
//! envelope and its codec, Stored Record shapes, control flags, group-key
//! policies, per-stage error types, and the port traits the infrastructure
//! crates implement.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** No I/O lives here. The crate defines *what*
//! the relay needs from a queue, a record store, a backend and an error
//! reporter; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `MessageId`, `GroupKey`, `QueueName`, `TableName`, `InvocationId` |
//! | [`types`] | `EventRequest`, `BackendRequest`, `RecordedStatus`, `Timestamp` |
//! | [`envelope`] | `Envelope` and its JSON codec |
//! | [`record`] | `StoredRecord`, `NewRecord`, `RecordUpdate` |
//! | [`control`] | test-rig control flags read from request bodies |
//! | [`group_key`] | `GroupKeyPolicy` and its implementations |
//! | [`errors`] | per-stage error types |
//! | [`ports`] | `RecordStore`, `RecordReader`, `BackendInvoker`, `QueuePublisher`, `ErrorReporter` |

pub mod control;
pub mod envelope;
pub mod errors;
pub mod group_key;
pub mod identifiers;
pub mod ports;
pub mod record;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use control::{forced_status, ControlFlags, FlagsUnavailable};
pub use envelope::Envelope;
pub use errors::{
    BackendError, EnvelopeError, GroupKeyError, InvocationError, PublishError, StoreError,
};
pub use group_key::{BodyFieldGroupKey, ConstantGroupKey, GroupKeyPolicy};
pub use identifiers::{GroupKey, InvocationId, MessageId, QueueName, TableName, GROUPING_DISABLED};
pub use ports::{
    BackendInvoker, Deduplication, DeliveredMessage, ErrorReporter, Incident, OutboundMessage,
    QueuePublisher, RecordReader, RecordStore, RelayStage,
};
pub use record::{InsertOutcome, NewRecord, RecordUpdate, StoredRecord};
pub use types::{
    BackendRequest, BackendResponse, EventRequest, Headers, PublishResult, QueryParameters,
    RecordedStatus, Timestamp, NO_RESPONSE_SENTINEL,
};
