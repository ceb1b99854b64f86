//! The queue message envelope and its JSON codec.
//!
//! Wire format:
//!
//! ```json
//! {
//!   "request": { "path": "/health", "headers": {}, "body": "...",
//!                "httpMethod": "POST", "queryStringParameters": null },
//!   "received_timestamp": 1700000000000,
//!   "sqs_publish_result": { "return_code": 200, "body": "...", "message_id": "..." }
//! }
//! ```
//!
//! `sqs_publish_result` only ever appears in the ingestion handler's publish
//! log; the envelope is published without it.

use serde::{Deserialize, Serialize};

use crate::{EnvelopeError, EventRequest, PublishResult, Timestamp};

/// An inbound webhook call wrapped for transport through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The captured inbound request.
    pub request: EventRequest,

    /// Epoch milliseconds at which the ingestion handler accepted the call.
    pub received_timestamp: i64,

    /// Result of publishing this envelope; only set for logging.
    #[serde(
        rename = "sqs_publish_result",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_result: Option<PublishResult>,
}

impl Envelope {
    /// Wraps `request` with the given receive time.
    pub fn new(request: EventRequest, received_at: Timestamp) -> Self {
        Self {
            request,
            received_timestamp: received_at.as_epoch_millis(),
            publish_result: None,
        }
    }

    /// Returns a copy decorated with the outcome of its publish attempt.
    pub fn with_publish_result(&self, result: PublishResult) -> Self {
        Self {
            publish_result: Some(result),
            ..self.clone()
        }
    }

    /// Serialises the envelope into a queue message body.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Parses a queue message body.
    pub fn decode(body: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(body).map_err(EnvelopeError::Decode)
    }

    /// Returns the request serialised the way the Stored Record keeps it.
    pub fn request_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(&self.request).map_err(EnvelopeError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Headers;

    fn envelope() -> Envelope {
        let request = EventRequest {
            path: "/health".to_string(),
            headers: Headers::new(),
            body: Some(r#"{"order_id":"123456"}"#.to_string()),
            http_method: "POST".to_string(),
            query_string_parameters: None,
        };
        Envelope::new(request, Timestamp::from_epoch_millis(1_700_000_000_000).unwrap())
    }

    #[test]
    fn published_envelope_omits_the_publish_result() {
        let json: serde_json::Value = serde_json::from_str(&envelope().encode().unwrap()).unwrap();

        assert_eq!(json["received_timestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["request"]["path"], "/health");
        assert!(json["request"]["queryStringParameters"].is_null());
        assert!(json.get("sqs_publish_result").is_none());
    }

    #[test]
    fn decoded_envelope_equals_the_encoded_one() {
        let original = envelope();
        let decoded = Envelope::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn publish_result_uses_its_wire_name() {
        let decorated = envelope().with_publish_result(PublishResult {
            return_code: 500,
            body: "{}".to_string(),
            message_id: None,
        });
        let json = serde_json::to_value(&decorated).unwrap();
        assert_eq!(json["sqs_publish_result"]["return_code"], 500);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(Envelope::decode("not json"), Err(EnvelopeError::Decode(_))));
        assert!(matches!(Envelope::decode(r#"{"request":{}}"#), Err(EnvelopeError::Decode(_))));
    }
}
