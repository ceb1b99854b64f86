//! Newtype domain identifiers.
//!
//! Every relay concept that has an identity is a distinct newtype wrapping a
//! primitive. This keeps a [`MessageId`] from being passed
//! where a [`GroupKey`] is expected, even though both are strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: queue-assigned
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies one published message.
    ///
    /// Assigned by the queue substrate at publish time and never changed
    /// afterwards. It is also the key of the message's Stored Record, so every
    /// redelivery of the same message lands on the same record.
    MessageId
}

impl MessageId {
    /// Generates a fresh random identifier, the way the queue substrate
    /// assigns them.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

string_id! {
    /// Ordering partition key for the queue substrate.
    ///
    /// Messages sharing a group key are delivered strictly in publish order,
    /// one at a time. Messages in different groups have no relative ordering.
    GroupKey
}

/// Group key used when grouping is disabled.
pub const GROUPING_DISABLED: &str = "grouping-disabled";

impl GroupKey {
    /// The single group every message joins when ordering is not partitioned.
    pub fn grouping_disabled() -> Self {
        Self(GROUPING_DISABLED.to_string())
    }
}

// ---------------------------------------------------------------------------
// Identifiers: configuration names
// ---------------------------------------------------------------------------

string_id! {
    /// Name of the ordered queue the ingestion handler publishes to.
    QueueName
}

string_id! {
    /// Name of the table (or directory) holding Stored Records.
    TableName
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single consumer invocation.
///
/// Generated fresh for every invocation and attached to its span, so the
/// activity of one delivery attempt can be told apart from a redelivery of the
/// same [`MessageId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(MessageId::new("").is_none());
        assert!(GroupKey::new(String::new()).is_none());
        assert_eq!(QueueName::new("relay.fifo").unwrap().as_str(), "relay.fifo");
    }

    #[test]
    fn random_message_ids_are_distinct() {
        let a = MessageId::random();
        let b = MessageId::random();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn identifiers_serialize_as_plain_strings() {
        let key = GroupKey::new("order-42").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"order-42\"");
    }
}
