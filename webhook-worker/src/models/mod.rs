//! Data model for webhook subscriptions and delivery attempts.

pub mod event;
pub mod webhook;

pub use event::EventType;
pub use webhook::{
    DeliveryStatus, NewDelivery, NewWebhook, Organization, Webhook, WebhookDelivery,
};
