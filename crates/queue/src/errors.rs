use relay::MessageId;
use thiserror::Error;

/// Queue operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been closed and accepts no more messages.
    #[error("Queue is closed")]
    Closed,

    /// The receipt does not match the in-flight delivery of its message:
    /// the message was already acknowledged or released.
    #[error("Receipt for message {message_id} is no longer valid")]
    StaleReceipt {
        /// Message the receipt was issued for.
        message_id: MessageId,
    },

    /// The on-disk journal could not be read or written.
    #[error("Queue journal {path} failed: {message}")]
    Journal {
        /// Journal file.
        path: String,
        /// Underlying I/O failure.
        message: String,
    },
}
