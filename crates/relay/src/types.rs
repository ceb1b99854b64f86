//! Shared value types for the relay domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. a recorded status is either a real
//! HTTP status code or the explicit "no response" sentinel) and take part in
//! the relay's decisions.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::MessageId;

/// Header map of an inbound request. Multi-valued headers are collapsed into
/// one comma-joined value before they reach this map.
pub type Headers = BTreeMap<String, String>;

/// Query parameters of an inbound request. Repeated keys keep the last value.
pub type QueryParameters = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Inbound request
// ---------------------------------------------------------------------------

/// The inbound webhook call as captured by the ingestion handler.
///
/// The field names on the wire follow the queue message envelope format
/// (`httpMethod`, `queryStringParameters`), which is also the format persisted
/// in the Stored Record's `request` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    /// Request path including its leading slash (e.g. `"/health"`).
    pub path: String,

    /// Request headers.
    pub headers: Headers,

    /// Raw request body. Opaque to the relay; `None` when the request had no
    /// body.
    pub body: Option<String>,

    /// HTTP method, upper-case (e.g. `"POST"`).
    #[serde(rename = "httpMethod")]
    pub http_method: String,

    /// Query parameters, `None` when the request had none.
    #[serde(rename = "queryStringParameters")]
    pub query_string_parameters: Option<QueryParameters>,
}

impl EventRequest {
    /// Returns the value of `name`, matching header names case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Publish result
// ---------------------------------------------------------------------------

/// Summary of a publish attempt, attached to the envelope for the publish log.
///
/// Never sent through the queue: the envelope is published before this is
/// known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// HTTP status the ingestion handler answered with.
    pub return_code: u16,
    /// JSON body the ingestion handler answered with.
    pub body: String,
    /// Identifier assigned by the queue, if the publish succeeded.
    pub message_id: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Backend call
// ---------------------------------------------------------------------------

/// The outbound request the relay consumer asks the backend invoker to send.
///
/// The path is relative (its leading slash removed) so that resolving it
/// against the backend base URL keeps the base URL's own path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    /// HTTP method copied from the inbound request.
    pub method: String,
    /// Relative path, never starting with `/`.
    pub path: String,
    /// Query parameters copied verbatim.
    pub query: Option<QueryParameters>,
    /// Body copied verbatim.
    pub body: Option<String>,
    /// `Content-Type` of the inbound request, if any.
    pub content_type: Option<String>,
}

impl BackendRequest {
    /// Builds the outbound request for an inbound webhook call.
    pub fn from_event_request(request: &EventRequest) -> Self {
        let path = request
            .path
            .strip_prefix('/')
            .unwrap_or(&request.path)
            .to_string();

        Self {
            method: request.http_method.clone(),
            path,
            query: request.query_string_parameters.clone(),
            body: request.body.clone(),
            content_type: request.header("content-type").map(str::to_string),
        }
    }
}

/// A response obtained from the backend, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl BackendResponse {
    /// Returns `true` for statuses below 300.
    pub fn is_success(&self) -> bool {
        self.status < 300
    }
}

// ---------------------------------------------------------------------------
// Recorded status
// ---------------------------------------------------------------------------

/// Sentinel persisted when the backend call produced no response at all.
pub const NO_RESPONSE_SENTINEL: &str = "no_response";

/// The backend outcome persisted in `backend_response_status_code`.
///
/// Serialised as a string: the decimal status code (e.g. `"404"`) or
/// [`NO_RESPONSE_SENTINEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RecordedStatus {
    /// The backend answered with this status code.
    Code(u16),
    /// The backend could not be reached or did not answer.
    NoResponse,
}

impl RecordedStatus {
    /// Returns `true` if this outcome must be treated as a backend failure.
    pub fn is_failure(self) -> bool {
        match self {
            RecordedStatus::Code(status) => status >= 300,
            RecordedStatus::NoResponse => true,
        }
    }
}

impl std::fmt::Display for RecordedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordedStatus::Code(status) => write!(f, "{status}"),
            RecordedStatus::NoResponse => f.write_str(NO_RESPONSE_SENTINEL),
        }
    }
}

impl From<RecordedStatus> for String {
    fn from(status: RecordedStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for RecordedStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == NO_RESPONSE_SENTINEL {
            return Ok(RecordedStatus::NoResponse);
        }
        value
            .parse::<u16>()
            .map(RecordedStatus::Code)
            .map_err(|_| format!("invalid backend status '{value}'"))
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly. Envelopes and records carry it as integer epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from epoch milliseconds, `None` if out of range.
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Returns the timestamp as epoch milliseconds.
    pub fn as_epoch_millis(self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
