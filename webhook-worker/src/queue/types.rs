//! Message types for the event queue.

use serde::{Deserialize, Serialize};

use crate::models::{EventType, Organization};

/// Queue name for domain events awaiting webhook dispatch.
pub const EVENTS_QUEUE: &str = "webhook_events";

/// A domain event published by application code.
///
/// The consumer hands it straight to [`crate::Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: EventType,
    /// Caller-supplied payload, sent as the envelope's `data`
    #[serde(default)]
    pub data: serde_json::Value,
    /// Organization the event belongs to; `None` for system-wide events
    #[serde(default)]
    pub organization: Option<Organization>,
}

impl EventMessage {
    pub fn new(
        event: EventType,
        data: serde_json::Value,
        organization: Option<Organization>,
    ) -> Self {
        Self {
            event,
            data,
            organization,
        }
    }

    /// Message id used for tracing through the broker.
    pub fn message_id(&self) -> String {
        let scope = self
            .organization
            .as_ref()
            .map(|o| o.id.to_string())
            .unwrap_or_else(|| "global".to_string());
        format!(
            "{}-{}-{}",
            self.event,
            scope,
            chrono::Utc::now().timestamp_millis()
        )
    }
}
