//! Webhook relay orchestration.
//!
//! This crate provides the two halves of the relay: the [`IngestionHandler`]
//! that turns an inbound webhook call into a queued envelope, and the
//! [`RelayConsumer`] that drives one delivered envelope through the relay
//! state machine. It also provides the default [`ErrorReporter`]
//! implementations.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The stages sequence calls between domain logic in
//! the [`relay`] crate and the port traits (queue, record store, backend,
//! error reporter). They perform no I/O of their own.
//!
//! [`ErrorReporter`]: relay::ErrorReporter

pub mod consumer;
pub mod ingestion;
pub mod reporting;

#[cfg(test)]
mod testing;

pub use consumer::{ConsumerSettings, Disposition, InvocationReport, RelayConsumer, RelayState};
pub use ingestion::{IngestResponse, IngestionHandler, IngestionSettings};
pub use reporting::{CollectingReporter, TracingErrorReporter};
