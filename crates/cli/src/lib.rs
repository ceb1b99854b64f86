//! Webhook relay composition root.
//!
//! Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags and environment variables
//!    are validated once into a [`RelayConfig`].
//! 2. **Wire observability**: a JSON `tracing-subscriber` layer plus an
//!    optional OpenTelemetry OTLP exporter ([`telemetry`]).
//! 3. **Construct infrastructure**: queue, record store, backend invoker and
//!    error reporter, injected into the ingestion handler and relay consumer.
//! 4. **Serve**: the ingress and admin listeners and the queue dispatcher run
//!    until [`RunningRelay::shutdown`] is called ([`app`]).

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::{start, RunningRelay};
pub use config::{Args, ConfigError, RelayConfig};
