//! Persistence for webhooks and their delivery log.
//!
//! The dispatcher only needs filtered reads over webhooks and insert/update
//! over deliveries; the admin API uses the rest. Writes are synchronous and
//! each call is atomic with respect to other calls on the same store.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{NewDelivery, NewWebhook, Webhook, WebhookDelivery};

pub trait WebhookStore: Send + Sync {
    fn insert_webhook(&self, webhook: NewWebhook) -> Result<Webhook>;

    /// Replace the editable fields of a webhook, keeping its id and creation time.
    fn update_webhook(&self, id: u64, webhook: NewWebhook) -> Result<Webhook>;

    fn get_webhook(&self, id: u64) -> Result<Webhook>;

    /// All webhooks, ascending by id.
    fn list_webhooks(&self) -> Result<Vec<Webhook>>;

    /// Active webhooks, ascending by id.
    ///
    /// With `organization_id` set, only webhooks owned by that organization
    /// are returned, plus global ones when `include_global` is true. Without
    /// it, every active webhook is returned.
    fn active_webhooks(
        &self,
        organization_id: Option<u64>,
        include_global: bool,
    ) -> Result<Vec<Webhook>>;

    fn set_active(&self, id: u64, active: bool) -> Result<Webhook>;

    /// Hard-delete a webhook together with its deliveries.
    fn delete_webhook(&self, id: u64) -> Result<()>;

    /// Insert a pending delivery for an existing webhook.
    fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery>;

    /// Persist the outcome of a delivery. Rejects updates to rows that are
    /// already in a terminal state.
    fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()>;

    fn get_delivery(&self, id: u64) -> Result<WebhookDelivery>;

    /// Most recent deliveries of a webhook, newest first.
    fn list_deliveries(&self, webhook_id: u64, limit: usize) -> Result<Vec<WebhookDelivery>>;
}
