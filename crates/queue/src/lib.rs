//! In-process ordered queue for the webhook relay.
//!
//! [`FifoQueue`] provides the delivery guarantees the relay consumer relies
//! on:
//!
//! - **Per-group order.** Messages sharing a [`GroupKey`] are handed out in
//!   publish order, and the next one is withheld until the current one is
//!   acknowledged. A released message stays at the head of its group.
//! - **At-least-once delivery.** A message leaves the queue only through
//!   [`FifoQueue::ack`] or, once it has been received `max_receive_count`
//!   times, by moving to the dead-letter list.
//! - **Content-based deduplication.** Publishing a body byte-identical to one
//!   published within the dedup window returns the original message id and
//!   enqueues nothing.
//!
//! - **Durability, when opened on a directory.** [`FifoQueue::open`] keeps an
//!   append-only journal of publishes, acks and releases and rebuilds the
//!   queue from it on the next start. Messages restored this way are
//!   immediately visible; a message that was in flight at the crash is
//!   delivered again.
//!
//! Messages of different groups have no relative ordering.
//!
//! [`GroupKey`]: relay::GroupKey

mod errors;
mod fifo;
mod journal;

pub use errors::QueueError;
pub use fifo::{Delivery, FifoQueue, QueueSettings, Receipt, ReleaseOutcome};
