//! Test-only control flags carried inside webhook bodies.
//!
//! The end-to-end test rig marks deliberately failing calls by adding fields
//! to the JSON body it sends. The relay forwards the body untouched; these
//! flags only steer the relay's own reporting and acknowledgement:
//!
//! | Field | Effect |
//! |-------|--------|
//! | `suppress_sentry` | do not report failures of this call |
//! | `consume_bad_messages` | acknowledge the message even if the backend fails |
//! | `faux_backend_force_status_code` | read by the faux backend, not the relay |
//!
//! Flags follow JSON truthiness: `true`, non-zero numbers, non-empty strings,
//! arrays and objects are set; `false`, `0`, `""`, `null` and absence are not.

use serde_json::Value;

/// Body field that suppresses error reporting for one call.
pub const SUPPRESS_REPORTING_FIELD: &str = "suppress_sentry";

/// Body field that forces acknowledgement despite a backend failure.
pub const CONSUME_BAD_MESSAGES_FIELD: &str = "consume_bad_messages";

/// Body field the faux backend reads to choose its response status.
pub const FORCE_STATUS_FIELD: &str = "faux_backend_force_status_code";

/// Control flags extracted from one request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    /// Do not report failures of this call to the error reporter.
    pub suppress_reporting: bool,
    /// Acknowledge despite a backend failure (poison-message suppression).
    pub consume_bad_messages: bool,
}

/// Why a body yielded no flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagsUnavailable {
    /// The request had no body.
    NoBody,
    /// The body is not JSON (or not a JSON object).
    NotJsonObject,
}

impl std::fmt::Display for FlagsUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagsUnavailable::NoBody => f.write_str("request has no body"),
            FlagsUnavailable::NotJsonObject => f.write_str("request body is not a JSON object"),
        }
    }
}

impl ControlFlags {
    /// Reads the flags from a raw request body.
    ///
    /// Non-JSON bodies are legitimate webhook payloads; they yield
    /// `Err(FlagsUnavailable)` so the caller can log it, and
    /// [`ControlFlags::default`] is then the right fallback.
    pub fn from_body(body: Option<&str>) -> Result<Self, FlagsUnavailable> {
        let body = body.ok_or(FlagsUnavailable::NoBody)?;
        let value: Value =
            serde_json::from_str(body).map_err(|_| FlagsUnavailable::NotJsonObject)?;
        let object = value.as_object().ok_or(FlagsUnavailable::NotJsonObject)?;

        let flag = |name: &str| object.get(name).is_some_and(is_truthy);
        Ok(Self {
            suppress_reporting: flag(SUPPRESS_REPORTING_FIELD),
            consume_bad_messages: flag(CONSUME_BAD_MESSAGES_FIELD),
        })
    }
}

/// JSON truthiness as used by the test rig.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Reads `faux_backend_force_status_code` from a body, accepting either a
/// number or a numeric string.
pub fn forced_status(body: Option<&str>) -> Option<u16> {
    let value: Value = serde_json::from_str(body?).ok()?;
    match value.get(FORCE_STATUS_FIELD)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rig_body_sets_both_flags() {
        let flags = ControlFlags::from_body(Some(
            r#"{"order_id":"123456","suppress_sentry":true,"consume_bad_messages":true}"#,
        ))
        .unwrap();

        assert!(flags.suppress_reporting);
        assert!(flags.consume_bad_messages);
    }

    #[test]
    fn flags_follow_json_truthiness() {
        let flags =
            ControlFlags::from_body(Some(r#"{"suppress_sentry":"yes","consume_bad_messages":0}"#))
                .unwrap();
        assert!(flags.suppress_reporting);
        assert!(!flags.consume_bad_messages);

        let flags =
            ControlFlags::from_body(Some(r#"{"suppress_sentry":"","consume_bad_messages":1}"#))
                .unwrap();
        assert!(!flags.suppress_reporting);
        assert!(flags.consume_bad_messages);
    }

    #[test]
    fn opaque_bodies_yield_no_flags() {
        assert_eq!(ControlFlags::from_body(None), Err(FlagsUnavailable::NoBody));
        assert_eq!(
            ControlFlags::from_body(Some("<xml/>")),
            Err(FlagsUnavailable::NotJsonObject)
        );
        assert_eq!(
            ControlFlags::from_body(Some("[true]")),
            Err(FlagsUnavailable::NotJsonObject)
        );
    }

    #[test]
    fn forced_status_accepts_strings_and_numbers() {
        assert_eq!(forced_status(Some(r#"{"faux_backend_force_status_code":"404"}"#)), Some(404));
        assert_eq!(forced_status(Some(r#"{"faux_backend_force_status_code":500}"#)), Some(500));
        assert_eq!(forced_status(Some(r#"{"faux_backend_force_status_code":"abc"}"#)), None);
        assert_eq!(forced_status(Some("{}")), None);
        assert_eq!(forced_status(None), None);
    }
}
