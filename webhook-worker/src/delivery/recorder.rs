//! Durable record of each delivery attempt.
//!
//! A pending row is written before any network I/O so an attempt is never
//! lost, then moved exactly once to success or failed.

use std::sync::Arc;

use super::{truncate_chars, MAX_ERROR_MESSAGE_CHARS, MAX_RESPONSE_BODY_CHARS};
use crate::error::{Result, WebhookError};
use crate::models::{DeliveryStatus, EventType, NewDelivery, Webhook, WebhookDelivery};
use crate::store::WebhookStore;

/// Characters of the response body quoted in an HTTP failure message.
const ERROR_BODY_EXCERPT_CHARS: usize = 200;

#[derive(Clone)]
pub struct DeliveryRecorder {
    store: Arc<dyn WebhookStore>,
}

impl DeliveryRecorder {
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Persist a new pending delivery.
    pub fn begin(
        &self,
        webhook: &Webhook,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<WebhookDelivery> {
        self.store.insert_delivery(NewDelivery {
            webhook_id: webhook.id,
            event_type,
            payload,
        })
    }

    /// Record the HTTP response of a delivery.
    ///
    /// 2xx codes mark the delivery successful; anything else fails it with an
    /// `HTTP <code>` error message quoting the start of the body.
    pub fn complete(
        &self,
        record: &mut WebhookDelivery,
        response_code: u16,
        response_body: &str,
        duration_ms: u64,
    ) -> Result<()> {
        ensure_pending(record)?;

        record.response_code = Some(response_code);
        record.response_body = Some(truncate_chars(response_body, MAX_RESPONSE_BODY_CHARS));
        record.duration_ms = Some(duration_ms);

        if (200..300).contains(&response_code) {
            record.status = DeliveryStatus::Success;
        } else {
            let excerpt = truncate_chars(response_body, ERROR_BODY_EXCERPT_CHARS);
            let message = if excerpt.is_empty() {
                format!("HTTP {response_code}")
            } else {
                format!("HTTP {response_code}: {excerpt}")
            };
            record.status = DeliveryStatus::Failed;
            record.error_message = Some(truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS));
        }

        self.store.update_delivery(record)
    }

    /// Record a delivery that never produced an HTTP response.
    pub fn fail(
        &self,
        record: &mut WebhookDelivery,
        error_message: &str,
        duration_ms: Option<u64>,
    ) -> Result<()> {
        ensure_pending(record)?;

        record.status = DeliveryStatus::Failed;
        record.error_message = Some(truncate_chars(error_message, MAX_ERROR_MESSAGE_CHARS));
        if duration_ms.is_some() {
            record.duration_ms = duration_ms;
        }

        self.store.update_delivery(record)
    }
}

fn ensure_pending(record: &WebhookDelivery) -> Result<()> {
    if record.status.is_terminal() {
        return Err(WebhookError::AlreadyFinalized(record.id));
    }
    Ok(())
}
