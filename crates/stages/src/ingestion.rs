//! The ingestion handler: accept a webhook call and publish it to the queue.
//!
//! The handler never fails. Whatever happens, the caller gets one of three
//! answers:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | queued; the body carries `message_id` |
//! | 400 | no group key could be derived; nothing was published |
//! | 500 | the queue publish failed; nothing was retained |
//!
//! Every publish attempt is logged with the envelope decorated by its
//! [`PublishResult`].

use std::collections::BTreeMap;
use std::sync::Arc;

use relay::{
    ControlFlags, Deduplication, Envelope, ErrorReporter, EventRequest, GroupKeyPolicy, Incident,
    MessageId, OutboundMessage, PublishResult, QueueName, QueuePublisher, RelayStage, Timestamp,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Configuration the ingestion handler is constructed with.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Queue the handler publishes to; used for log context.
    pub queue_name: QueueName,
}

/// The synchronous answer to an inbound webhook call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestResponse {
    /// HTTP status.
    pub status_code: u16,
    /// Response headers; always `Content-Type: application/json`.
    pub headers: BTreeMap<String, String>,
    /// JSON body; always contains `msg`.
    pub body: Value,
}

impl IngestResponse {
    fn json(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body,
        }
    }

    /// The message identifier of an accepted call.
    pub fn message_id(&self) -> Option<&str> {
        self.body.get("message_id").and_then(Value::as_str)
    }
}

/// Accepts inbound webhook calls and publishes them as envelopes.
pub struct IngestionHandler {
    publisher: Arc<dyn QueuePublisher>,
    group_keys: Arc<dyn GroupKeyPolicy>,
    reporter: Arc<dyn ErrorReporter>,
    settings: IngestionSettings,
}

impl IngestionHandler {
    /// Creates a handler publishing through `publisher`.
    pub fn new(
        publisher: Arc<dyn QueuePublisher>,
        group_keys: Arc<dyn GroupKeyPolicy>,
        reporter: Arc<dyn ErrorReporter>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            publisher,
            group_keys,
            reporter,
            settings,
        }
    }

    /// Handles one inbound call.
    pub async fn handle(&self, request: EventRequest) -> IngestResponse {
        let flags = ControlFlags::from_body(request.body.as_deref()).unwrap_or_default();

        let group_key = match self.group_keys.group_key(&request) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    path = %request.path,
                    method = %request.http_method,
                    error = %e,
                    "Unable to determine group key, rejecting request"
                );
                return IngestResponse::json(
                    400,
                    json!({ "msg": "Unable to determine MessageGroupId" }),
                );
            }
        };

        let envelope = Envelope::new(request, Timestamp::now());
        let outcome = match envelope.encode() {
            Ok(body) => {
                self.publisher
                    .publish(OutboundMessage {
                        group_key: group_key.clone(),
                        body,
                        deduplication: Deduplication::ContentBased,
                    })
                    .await
            }
            Err(e) => Err(relay::PublishError::Rejected {
                code: "EnvelopeEncoding".to_string(),
                message: e.to_string(),
            }),
        };

        let (response, message_id) = match outcome {
            Ok(message_id) => (
                IngestResponse::json(
                    200,
                    json!({
                        "msg": format!(
                            "You have added a message to the queue! Message ID is {message_id}"
                        ),
                        "message_id": message_id.as_str(),
                    }),
                ),
                Some(message_id),
            ),
            Err(e) => {
                let msg = "Error submitting event to the queue";
                if !flags.suppress_reporting {
                    self.reporter.report(
                        Incident::new(RelayStage::Publish, msg)
                            .with_extra("queue", self.settings.queue_name.as_str())
                            .with_extra("group_key", group_key.as_str())
                            .with_extra("error", e.to_string()),
                    );
                }
                (
                    IngestResponse::json(500, json!({ "msg": msg, "error": e.to_string() })),
                    None,
                )
            }
        };

        self.log_publish_result(&envelope, &response, message_id);
        response
    }

    fn log_publish_result(
        &self,
        envelope: &Envelope,
        response: &IngestResponse,
        message_id: Option<MessageId>,
    ) {
        let summary = envelope.with_publish_result(PublishResult {
            return_code: response.status_code,
            body: response.body.to_string(),
            message_id,
        });
        let summary = serde_json::to_string(&summary)
            .unwrap_or_else(|e| format!("<unserialisable envelope: {e}>"));

        if response.status_code == 200 {
            info!(
                queue = %self.settings.queue_name,
                message_id = response.message_id(),
                envelope = %summary,
                "Successfully published event to queue"
            );
        } else {
            error!(
                queue = %self.settings.queue_name,
                envelope = %summary,
                "Failed to publish event to queue"
            );
        }
    }
}
