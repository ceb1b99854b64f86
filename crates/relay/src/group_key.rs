//! Group key derivation policies.
//!
//! The group key decides which webhooks are serialised with each other. The
//! default [`ConstantGroupKey`] puts every call into one group, so ordering is
//! global. [`BodyFieldGroupKey`] partitions by a field of the JSON body (for
//! example `order_id`), keeping calls about one order in order while letting
//! unrelated orders flow concurrently.

use serde_json::Value;

use crate::{EventRequest, GroupKey, GroupKeyError};

/// Derives the ordering key for an inbound request.
pub trait GroupKeyPolicy: Send + Sync {
    /// Returns the group key for `request`, or why none can be derived.
    fn group_key(&self, request: &EventRequest) -> Result<GroupKey, GroupKeyError>;
}

/// Puts every request into the same group.
#[derive(Debug, Clone)]
pub struct ConstantGroupKey {
    key: GroupKey,
}

impl ConstantGroupKey {
    /// Uses `key` for every request.
    pub fn new(key: GroupKey) -> Self {
        Self { key }
    }
}

impl Default for ConstantGroupKey {
    fn default() -> Self {
        Self {
            key: GroupKey::grouping_disabled(),
        }
    }
}

impl GroupKeyPolicy for ConstantGroupKey {
    fn group_key(&self, _request: &EventRequest) -> Result<GroupKey, GroupKeyError> {
        Ok(self.key.clone())
    }
}

/// Uses a top-level field of the JSON body as the group key.
///
/// String values are used as-is; numbers use their JSON rendering. Requests
/// without the field cannot be ordered and are rejected.
#[derive(Debug, Clone)]
pub struct BodyFieldGroupKey {
    field: String,
}

impl BodyFieldGroupKey {
    /// Partitions on `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// The body field this policy reads.
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl GroupKeyPolicy for BodyFieldGroupKey {
    fn group_key(&self, request: &EventRequest) -> Result<GroupKey, GroupKeyError> {
        let not_json = || GroupKeyError::BodyNotJson {
            field: self.field.clone(),
        };

        let body = request.body.as_deref().ok_or_else(not_json)?;
        let value: Value = serde_json::from_str(body).map_err(|_| not_json())?;
        let object = value.as_object().ok_or_else(not_json)?;

        let raw = match object.get(&self.field) {
            None | Some(Value::Null) => {
                return Err(GroupKeyError::MissingField {
                    field: self.field.clone(),
                })
            }
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => String::new(),
        };

        GroupKey::new(raw).ok_or_else(|| GroupKeyError::InvalidValue {
            field: self.field.clone(),
        })
    }
}
