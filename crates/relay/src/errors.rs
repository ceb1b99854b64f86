//! Error types for the relay domain.
//!
//! Each stage of the pipeline has its own error type so that the policy applied
//! at a call site is visible in its signature:
//!
//! - [`StoreError`]: audit writes; always logged and swallowed by the caller.
//! - [`BackendError`]: no response from the backend; folds into the
//!   redelivery decision.
//! - [`PublishError`]: queue publish; becomes an HTTP 500 at ingress.
//! - [`GroupKeyError`]: no ordering key; becomes an HTTP 400 at ingress.
//! - [`InvocationError`]: the only conditions that abort a consumer
//!   invocation before the state machine runs.

use thiserror::Error;

use crate::MessageId;

// ---------------------------------------------------------------------------
// Envelope codec
// ---------------------------------------------------------------------------

/// Failure to encode or decode a queue message envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope could not be serialised.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The message body is not a valid envelope.
    #[error("Failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Group key derivation
// ---------------------------------------------------------------------------

/// No ordering key could be derived for an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupKeyError {
    /// The policy needs a JSON body, but the request body is absent or not a
    /// JSON object.
    #[error("Request body is not a JSON object; cannot read '{field}'")]
    BodyNotJson {
        /// Body field the policy partitions on.
        field: String,
    },

    /// The JSON body does not contain the partition field.
    #[error("Request body has no '{field}' field")]
    MissingField {
        /// Body field the policy partitions on.
        field: String,
    },

    /// The partition field is present but not a non-empty string or number.
    #[error("Request body field '{field}' is not usable as a group key")]
    InvalidValue {
        /// Body field the policy partitions on.
        field: String,
    },
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Failure reported by a record store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the write.
    #[error("Record store unavailable: {message}")]
    Unavailable {
        /// Provider-specific description.
        message: String,
    },

    /// A record could not be serialised or a stored record could not be read
    /// back.
    #[error("Record serialisation failed: {message}")]
    Serialization {
        /// Description of the problem.
        message: String,
    },
}

/// Failure to publish an envelope to the ordered queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The queue is unreachable or no longer accepting messages.
    #[error("Queue unavailable: {message}")]
    Unavailable {
        /// Provider-specific description.
        message: String,
    },

    /// The queue rejected the message.
    #[error("Queue rejected message ({code}): {message}")]
    Rejected {
        /// Provider error code.
        code: String,
        /// Provider-specific description.
        message: String,
    },
}

/// The backend call produced no HTTP response.
///
/// A response with an error status is *not* a `BackendError`: it is returned
/// as a [`crate::BackendResponse`] so its status can be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request path or query could not be resolved into a URL.
    #[error("Invalid backend URL for path '{path}': {message}")]
    InvalidUrl {
        /// Relative path that failed to resolve.
        path: String,
        /// Parser message.
        message: String,
    },

    /// The inbound method is not a valid HTTP method token.
    #[error("Invalid HTTP method '{method}'")]
    InvalidMethod {
        /// The offending method string.
        method: String,
    },

    /// The backend did not answer within the request timeout.
    #[error("Backend request timed out")]
    Timeout,

    /// Connection refused, DNS failure, reset, or a body that could not be read.
    #[error("Backend transport failure: {message}")]
    Transport {
        /// Client-specific description.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Consumer invocation
// ---------------------------------------------------------------------------

/// Conditions that stop a consumer invocation before (or instead of) the
/// relay state machine.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The substrate delivered a number of records other than one.
    ///
    /// Records cannot be acknowledged or failed individually in that case, so
    /// nothing is processed and nothing is written.
    #[error(
        "Expected exactly one record per invocation, received {received}; \
         individual ack/fail is impossible, aborting"
    )]
    ProtocolViolation {
        /// Number of records in the invocation.
        received: usize,
    },

    /// The message body is not a decodable envelope.
    #[error("Message {message_id} carries a malformed envelope: {source}")]
    MalformedEnvelope {
        /// The delivered message.
        message_id: MessageId,
        /// Decoder failure.
        #[source]
        source: EnvelopeError,
    },
}
