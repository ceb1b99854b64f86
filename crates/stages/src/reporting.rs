//! [`ErrorReporter`] implementations.

use std::sync::Mutex;

use relay::{ErrorReporter, Incident};
use serde_json::Value;

/// Emits every incident as an `error`-level event on the `relay::incident`
/// target, where the process-wide subscriber (and its OpenTelemetry layer)
/// picks it up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, incident: Incident) {
        let extra = Value::Object(incident.extra);
        tracing::error!(
            target: "relay::incident",
            stage = %incident.stage,
            message_id = incident.message_id.as_ref().map(|id| id.as_str()),
            extra = %extra,
            "{}",
            incident.message
        );
    }
}

/// Keeps incidents in memory so they can be inspected.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    incidents: Mutex<Vec<Incident>>,
}

impl CollectingReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every incident reported so far.
    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .map(|incidents| incidents.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, incident: Incident) {
        if let Ok(mut incidents) = self.incidents.lock() {
            incidents.push(incident);
        }
    }
}
