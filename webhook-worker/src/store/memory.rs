//! In-process webhook store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::WebhookStore;
use crate::error::{Result, WebhookError};
use crate::models::{NewDelivery, NewWebhook, Webhook, WebhookDelivery};

/// Tables shared by [`MemoryStore`] and [`super::FileStore`].
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) webhooks: BTreeMap<u64, Webhook>,
    pub(crate) deliveries: BTreeMap<u64, WebhookDelivery>,
    next_webhook_id: u64,
    next_delivery_id: u64,
}

/// Highest ids ever handed out. Persisted so ids of deleted rows are never
/// reused after a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LastIds {
    pub(crate) webhook_id: u64,
    pub(crate) delivery_id: u64,
}

impl Tables {
    pub(crate) fn from_rows(
        webhooks: Vec<Webhook>,
        deliveries: Vec<WebhookDelivery>,
        last_ids: LastIds,
    ) -> Self {
        let webhooks: BTreeMap<u64, Webhook> = webhooks.into_iter().map(|w| (w.id, w)).collect();
        // Orphaned rows would violate the cascade; drop them on load.
        let deliveries: BTreeMap<u64, WebhookDelivery> = deliveries
            .into_iter()
            .filter(|d| webhooks.contains_key(&d.webhook_id))
            .map(|d| (d.id, d))
            .collect();

        Self {
            next_webhook_id: webhooks
                .keys()
                .max()
                .copied()
                .unwrap_or(0)
                .max(last_ids.webhook_id),
            next_delivery_id: deliveries
                .keys()
                .max()
                .copied()
                .unwrap_or(0)
                .max(last_ids.delivery_id),
            webhooks,
            deliveries,
        }
    }

    pub(crate) fn last_ids(&self) -> LastIds {
        LastIds {
            webhook_id: self.next_webhook_id,
            delivery_id: self.next_delivery_id,
        }
    }

    pub(crate) fn insert_webhook(&mut self, webhook: NewWebhook) -> Webhook {
        self.next_webhook_id += 1;
        let webhook = webhook.into_webhook(self.next_webhook_id, Utc::now());
        self.webhooks.insert(webhook.id, webhook.clone());
        webhook
    }

    pub(crate) fn update_webhook(&mut self, id: u64, update: NewWebhook) -> Result<Webhook> {
        let existing = self
            .webhooks
            .get_mut(&id)
            .ok_or(WebhookError::WebhookNotFound(id))?;
        *existing = update.into_webhook(id, existing.created_at);
        Ok(existing.clone())
    }

    pub(crate) fn get_webhook(&self, id: u64) -> Result<Webhook> {
        self.webhooks
            .get(&id)
            .cloned()
            .ok_or(WebhookError::WebhookNotFound(id))
    }

    pub(crate) fn active_webhooks(
        &self,
        organization_id: Option<u64>,
        include_global: bool,
    ) -> Vec<Webhook> {
        self.webhooks
            .values()
            .filter(|w| w.is_active)
            .filter(|w| match organization_id {
                None => true,
                Some(org) => match w.organization_id() {
                    Some(owner) => owner == org,
                    None => include_global,
                },
            })
            .cloned()
            .collect()
    }

    pub(crate) fn set_active(&mut self, id: u64, active: bool) -> Result<Webhook> {
        let webhook = self
            .webhooks
            .get_mut(&id)
            .ok_or(WebhookError::WebhookNotFound(id))?;
        webhook.is_active = active;
        Ok(webhook.clone())
    }

    pub(crate) fn delete_webhook(&mut self, id: u64) -> Result<()> {
        self.webhooks
            .remove(&id)
            .ok_or(WebhookError::WebhookNotFound(id))?;
        self.deliveries.retain(|_, d| d.webhook_id != id);
        Ok(())
    }

    pub(crate) fn insert_delivery(&mut self, delivery: NewDelivery) -> Result<WebhookDelivery> {
        if !self.webhooks.contains_key(&delivery.webhook_id) {
            return Err(WebhookError::WebhookNotFound(delivery.webhook_id));
        }
        self.next_delivery_id += 1;
        let delivery = delivery.into_delivery(self.next_delivery_id, Utc::now());
        self.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    pub(crate) fn update_delivery(&mut self, delivery: &WebhookDelivery) -> Result<()> {
        let stored = self
            .deliveries
            .get_mut(&delivery.id)
            .ok_or(WebhookError::DeliveryNotFound(delivery.id))?;
        if stored.status.is_terminal() {
            return Err(WebhookError::AlreadyFinalized(delivery.id));
        }
        *stored = delivery.clone();
        Ok(())
    }

    pub(crate) fn get_delivery(&self, id: u64) -> Result<WebhookDelivery> {
        self.deliveries
            .get(&id)
            .cloned()
            .ok_or(WebhookError::DeliveryNotFound(id))
    }

    pub(crate) fn list_deliveries(&self, webhook_id: u64, limit: usize) -> Vec<WebhookDelivery> {
        self.deliveries
            .values()
            .rev()
            .filter(|d| d.webhook_id == webhook_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

pub(crate) fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>> {
    tables
        .lock()
        .map_err(|_| WebhookError::Storage("store lock poisoned".to_string()))
}

/// Webhook store held entirely in memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebhookStore for MemoryStore {
    fn insert_webhook(&self, webhook: NewWebhook) -> Result<Webhook> {
        Ok(lock(&self.tables)?.insert_webhook(webhook))
    }

    fn update_webhook(&self, id: u64, webhook: NewWebhook) -> Result<Webhook> {
        lock(&self.tables)?.update_webhook(id, webhook)
    }

    fn get_webhook(&self, id: u64) -> Result<Webhook> {
        lock(&self.tables)?.get_webhook(id)
    }

    fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        Ok(lock(&self.tables)?.webhooks.values().cloned().collect())
    }

    fn active_webhooks(
        &self,
        organization_id: Option<u64>,
        include_global: bool,
    ) -> Result<Vec<Webhook>> {
        Ok(lock(&self.tables)?.active_webhooks(organization_id, include_global))
    }

    fn set_active(&self, id: u64, active: bool) -> Result<Webhook> {
        lock(&self.tables)?.set_active(id, active)
    }

    fn delete_webhook(&self, id: u64) -> Result<()> {
        lock(&self.tables)?.delete_webhook(id)
    }

    fn insert_delivery(&self, delivery: NewDelivery) -> Result<WebhookDelivery> {
        lock(&self.tables)?.insert_delivery(delivery)
    }

    fn update_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        lock(&self.tables)?.update_delivery(delivery)
    }

    fn get_delivery(&self, id: u64) -> Result<WebhookDelivery> {
        lock(&self.tables)?.get_delivery(id)
    }

    fn list_deliveries(&self, webhook_id: u64, limit: usize) -> Result<Vec<WebhookDelivery>> {
        Ok(lock(&self.tables)?.list_deliveries(webhook_id, limit))
    }
}
