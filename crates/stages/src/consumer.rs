//! The relay consumer: one delivered message through the relay state machine.
//!
//! ```text
//! RECEIVED → STORED → BACKEND_CALLED → RECORDED → { ACK | REDELIVER }
//! ```
//!
//! The record writes either side of the backend call are best-effort: their
//! failures are logged and reported, and processing carries on. Only the
//! backend call decides the [`Disposition`].

use std::sync::Arc;

use relay::{
    BackendError, BackendInvoker, BackendRequest, BackendResponse, ControlFlags,
    DeliveredMessage, Envelope, ErrorReporter, FlagsUnavailable, GroupKey, Incident,
    InsertOutcome, InvocationError, InvocationId, MessageId, NewRecord, RecordStore,
    RecordUpdate, RecordedStatus, RelayStage, StoreError, TableName,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Configuration the consumer is constructed with.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Table the records are written to; used for log context.
    pub table_name: TableName,
}

/// Position of a message in the relay state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Received,
    Stored,
    BackendCalled,
    Recorded,
    Acked,
    Redeliver,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelayState::Received => "RECEIVED",
            RelayState::Stored => "STORED",
            RelayState::BackendCalled => "BACKEND_CALLED",
            RelayState::Recorded => "RECORDED",
            RelayState::Acked => "ACK",
            RelayState::Redeliver => "REDELIVER",
        };
        f.write_str(name)
    }
}

/// What the queue should do with the message once the invocation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the queue.
    Ack,
    /// Leave the message for redelivery.
    Redeliver,
}

impl Disposition {
    /// The terminal state this disposition corresponds to.
    pub fn state(self) -> RelayState {
        match self {
            Disposition::Ack => RelayState::Acked,
            Disposition::Redeliver => RelayState::Redeliver,
        }
    }
}

/// Everything that happened during one invocation.
#[derive(Debug)]
pub struct InvocationReport {
    pub invocation_id: InvocationId,
    pub message_id: MessageId,
    pub group_key: GroupKey,
    pub flags: ControlFlags,
    /// Outcome of the Stage 1 insert.
    pub stored: Result<InsertOutcome, StoreError>,
    /// Outcome of the backend call.
    pub backend: Result<BackendResponse, BackendError>,
    /// The status written by the Stage 3 update.
    pub status: RecordedStatus,
    /// Outcome of the Stage 3 update.
    pub recorded: Result<(), StoreError>,
    pub disposition: Disposition,
}

/// Relays delivered messages to the backend, recording each step.
pub struct RelayConsumer {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn BackendInvoker>,
    reporter: Arc<dyn ErrorReporter>,
    settings: ConsumerSettings,
}

impl RelayConsumer {
    /// Creates a consumer writing to `store` and forwarding through `backend`.
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn BackendInvoker>,
        reporter: Arc<dyn ErrorReporter>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            store,
            backend,
            reporter,
            settings,
        }
    }

    /// Runs one invocation.
    ///
    /// `records` must hold exactly one message. Any other count is a
    /// [`InvocationError::ProtocolViolation`]: nothing is processed and no
    /// record is written.
    pub async fn handle_invocation(
        &self,
        records: Vec<DeliveredMessage>,
    ) -> Result<InvocationReport, InvocationError> {
        let [message]: [DeliveredMessage; 1] = match records.try_into() {
            Ok(one) => one,
            Err(records) => {
                let violation = InvocationError::ProtocolViolation {
                    received: records.len(),
                };
                error!(received = records.len(), error = %violation, "Aborting invocation");
                self.reporter.report(
                    Incident::new(RelayStage::Subscribe, violation.to_string())
                        .with_extra("received", records.len()),
                );
                return Err(violation);
            }
        };

        let span = info_span!(
            "relay_invocation",
            message_id = %message.message_id,
            group_key = %message.group_key,
            receive_count = message.receive_count,
        );
        self.process(message).instrument(span).await
    }

    async fn process(&self, message: DeliveredMessage) -> Result<InvocationReport, InvocationError> {
        let invocation_id = InvocationId::new_random();
        debug!(%invocation_id, state = %RelayState::Received, "Message received");

        let envelope = match Envelope::decode(&message.body) {
            Ok(envelope) => envelope,
            Err(source) => {
                let failure = InvocationError::MalformedEnvelope {
                    message_id: message.message_id.clone(),
                    source,
                };
                error!(error = %failure, "Cannot relay message");
                self.reporter.report(
                    Incident::new(RelayStage::Subscribe, failure.to_string())
                        .with_message_id(&message.message_id)
                        .with_extra("group_key", message.group_key.as_str()),
                );
                return Err(failure);
            }
        };

        let flags = match ControlFlags::from_body(envelope.request.body.as_deref()) {
            Ok(flags) => flags,
            Err(FlagsUnavailable::NoBody) => {
                debug!("Request has no body, control flags default to false");
                ControlFlags::default()
            }
            Err(reason) => {
                warn!(%reason, "Unable to read control flags, defaulting to false");
                ControlFlags::default()
            }
        };

        // Stage 1: best-effort insert.
        let new_record =
            NewRecord::for_envelope(&message.message_id, &message.group_key, &envelope);
        let stored = match new_record {
            Ok(record) => self.store.insert(record).await,
            Err(e) => Err(StoreError::Serialization {
                message: e.to_string(),
            }),
        };
        match &stored {
            Ok(outcome) => debug!(
                state = %RelayState::Stored,
                ?outcome,
                table = %self.settings.table_name,
                "Record stored"
            ),
            Err(e) => self.store_failure(&message.message_id, flags, "insert", e),
        }

        // Stage 2: exactly one backend attempt.
        let request = BackendRequest::from_event_request(&envelope.request);
        let backend = self.backend.forward(&request).await;
        let status = match &backend {
            Ok(response) => {
                info!(
                    state = %RelayState::BackendCalled,
                    status = response.status,
                    path = %request.path,
                    "Backend responded"
                );
                RecordedStatus::Code(response.status)
            }
            Err(e) => {
                warn!(
                    state = %RelayState::BackendCalled,
                    error = %e,
                    path = %request.path,
                    "Backend gave no response"
                );
                RecordedStatus::NoResponse
            }
        };

        // Stage 3: best-effort status upsert.
        let recorded = self
            .store
            .update(&message.message_id, RecordUpdate::backend_status(status))
            .await;
        match &recorded {
            Ok(()) => debug!(state = %RelayState::Recorded, %status, "Backend status recorded"),
            Err(e) => self.store_failure(&message.message_id, flags, "update", e),
        }

        let disposition = if status.is_failure() {
            if !flags.suppress_reporting {
                let mut incident = Incident::new(
                    RelayStage::Subscribe,
                    format!("Backend call failed with status {status}"),
                )
                .with_message_id(&message.message_id)
                .with_extra("status", status.to_string())
                .with_extra("path", request.path.clone())
                .with_extra("consume_bad_messages", flags.consume_bad_messages);
                match &backend {
                    Ok(response) => incident = incident.with_extra("body", response.body.clone()),
                    Err(e) => incident = incident.with_extra("error", e.to_string()),
                }
                self.reporter.report(incident);
            }
            if flags.consume_bad_messages {
                Disposition::Ack
            } else {
                Disposition::Redeliver
            }
        } else {
            Disposition::Ack
        };

        match disposition {
            Disposition::Ack => info!(state = %disposition.state(), %status, "Invocation complete"),
            Disposition::Redeliver => warn!(
                state = %disposition.state(),
                %status,
                "Invocation failed, message will be redelivered"
            ),
        }

        Ok(InvocationReport {
            invocation_id,
            message_id: message.message_id,
            group_key: message.group_key,
            flags,
            stored,
            backend,
            status,
            recorded,
            disposition,
        })
    }

    fn store_failure(&self, id: &MessageId, flags: ControlFlags, operation: &str, e: &StoreError) {
        error!(
            operation,
            table = %self.settings.table_name,
            error = %e,
            "Record store write failed, continuing"
        );
        if !flags.suppress_reporting {
            self.reporter.report(
                Incident::new(RelayStage::Subscribe, format!("Record {operation} failed"))
                    .with_message_id(id)
                    .with_extra("table", self.settings.table_name.as_str())
                    .with_extra("error", e.to_string()),
            );
        }
    }
}
