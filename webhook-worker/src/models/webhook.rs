//! Webhook subscriptions and their delivery log rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventType;

/// Owning organization of a webhook, or the organization an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Organization {
    pub fn new(id: u64, slug: Option<String>) -> Self {
        Self { id, slug }
    }
}

/// A persisted subscription mapping an organization (or global scope) and a
/// set of event types to a destination URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: u64,
    pub name: String,
    /// `None` for global webhooks.
    pub organization: Option<Organization>,
    pub url: String,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, event: EventType) -> bool {
        self.events.contains(&event)
    }

    pub fn organization_id(&self) -> Option<u64> {
        self.organization.as_ref().map(|o| o.id)
    }

    pub fn organization_slug(&self) -> Option<&str> {
        self.organization.as_ref().and_then(|o| o.slug.as_deref())
    }

    /// Secret to sign with, ignoring blank values.
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Fields of a webhook before the store assigns an id.
///
/// Produced by [`crate::validation::WebhookForm::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhook {
    pub name: String,
    pub organization: Option<Organization>,
    pub url: String,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    pub custom_headers: BTreeMap<String, String>,
    pub is_active: bool,
}

impl NewWebhook {
    pub(crate) fn into_webhook(self, id: u64, created_at: DateTime<Utc>) -> Webhook {
        Webhook {
            id,
            name: self.name,
            organization: self.organization,
            url: self.url,
            events: self.events,
            secret: self.secret,
            custom_headers: self.custom_headers,
            is_active: self.is_active,
            created_at,
        }
    }
}

impl From<Webhook> for NewWebhook {
    fn from(webhook: Webhook) -> Self {
        NewWebhook {
            name: webhook.name,
            organization: webhook.organization,
            url: webhook.url,
            events: webhook.events,
            secret: webhook.secret,
            custom_headers: webhook.custom_headers,
            is_active: webhook.is_active,
        }
    }
}

/// Lifecycle of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// One attempted POST of an event to a webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: u64,
    pub webhook_id: u64,
    pub event_type: EventType,
    /// Snapshot of the envelope that was sent.
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a delivery before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub webhook_id: u64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

impl NewDelivery {
    pub(crate) fn into_delivery(self, id: u64, created_at: DateTime<Utc>) -> WebhookDelivery {
        WebhookDelivery {
            id,
            webhook_id: self.webhook_id,
            event_type: self.event_type,
            payload: self.payload,
            status: DeliveryStatus::Pending,
            response_code: None,
            response_body: None,
            duration_ms: None,
            error_message: None,
            created_at,
        }
    }
}
