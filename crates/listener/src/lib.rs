//! Webhook relay event surfaces.
//!
//! - [`ingress_router`]: accepts webhook calls on every method and path and
//!   hands them to the [`stages::IngestionHandler`].
//! - [`admin_router`]: health check and read-only access to Stored Records.
//! - [`QueueDispatcher`]: receives messages from the [`queue::FifoQueue`],
//!   runs the [`stages::RelayConsumer`] on each under a bounded pool and a
//!   wall-clock budget, and turns the outcome into an ack or a release.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing and the invocation loop live here. The
//! stages see neither axum types nor queue receipts.

mod admin;
mod dispatcher;
mod ingress;

pub use admin::admin_router;
pub use dispatcher::{DispatchOutcome, DispatcherSettings, QueueDispatcher};
pub use ingress::{event_request, ingress_router};
