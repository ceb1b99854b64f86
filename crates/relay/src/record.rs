//! Stored Record shapes.
//!
//! A Stored Record is the audit entry for one [`MessageId`]. It is created by
//! the consumer's Stage 1 insert and completed by the Stage 3 update. The
//! update is an upsert: if the insert was lost (store outage), the update still
//! creates a record holding the id and the backend outcome, which is why every
//! insert-time attribute is optional here.

use serde::{Deserialize, Serialize};

use crate::{Envelope, EnvelopeError, GroupKey, MessageId, RecordedStatus};

/// The persisted audit entry for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record key: the queue message identifier.
    pub id: MessageId,

    /// The queue message identifier as reported by the consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    /// Group key the message was delivered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupKey>,

    /// Epoch milliseconds at which ingestion accepted the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_timestamp: Option<i64>,

    /// The inbound request, JSON-encoded in the envelope's request format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    /// Outcome of the most recent backend call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_response_status_code: Option<RecordedStatus>,
}

impl StoredRecord {
    /// A record holding only what an insert writes.
    pub fn from_new(record: NewRecord) -> Self {
        Self {
            id: record.id,
            message_id: Some(record.message_id),
            group_id: Some(record.group_id),
            received_timestamp: Some(record.received_timestamp),
            request: Some(record.request),
            backend_response_status_code: None,
        }
    }

    /// A record created by an update on a missing key.
    pub fn from_update(id: MessageId, update: &RecordUpdate) -> Self {
        let mut record = Self {
            id,
            message_id: None,
            group_id: None,
            received_timestamp: None,
            request: None,
            backend_response_status_code: None,
        };
        record.apply(update);
        record
    }

    /// Merges the fields set in `update` over this record.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(status) = update.backend_response_status_code {
            self.backend_response_status_code = Some(status);
        }
    }
}

/// The attributes written by the Stage 1 insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Record key.
    pub id: MessageId,
    /// Same value as `id`, kept as its own attribute.
    pub message_id: MessageId,
    /// Derived group key.
    pub group_id: GroupKey,
    /// Envelope receive time, epoch milliseconds.
    pub received_timestamp: i64,
    /// JSON-encoded request.
    pub request: String,
}

impl NewRecord {
    /// Builds the insert for a delivered envelope.
    pub fn for_envelope(
        message_id: &MessageId,
        group_key: &GroupKey,
        envelope: &Envelope,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self {
            id: message_id.clone(),
            message_id: message_id.clone(),
            group_id: group_key.clone(),
            received_timestamp: envelope.received_timestamp,
            request: envelope.request_json()?,
        })
    }
}

/// The attributes written by the Stage 3 upsert. Unset fields leave the stored
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    /// Backend outcome of the latest attempt.
    pub backend_response_status_code: Option<RecordedStatus>,
}

impl RecordUpdate {
    /// An update recording a backend outcome.
    pub fn backend_status(status: RecordedStatus) -> Self {
        Self {
            backend_response_status_code: Some(status),
        }
    }
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record did not exist and was created.
    Created,
    /// A record with this id already existed (a redelivery); it was left as is.
    AlreadyPresent,
}
