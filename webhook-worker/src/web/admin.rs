//! Admin API for managing webhooks, inspecting deliveries and adjusting
//! dispatch settings.
//!
//! Secrets are write-only: responses carry `has_secret`, and the only
//! endpoint that returns a secret is `rotate-secret`, once.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::config::DispatchSettings;
use crate::error::{Result, WebhookError};
use crate::models::{EventType, NewWebhook, Organization, Webhook, WebhookDelivery};
use crate::validation::{generate_secret, WebhookForm, WebhookTestForm};

const DEFAULT_DELIVERY_LIMIT: usize = 50;
const MAX_DELIVERY_LIMIT: usize = 500;

/// Webhook as shown by the admin API.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookView {
    pub id: u64,
    pub name: String,
    pub organization: Option<Organization>,
    pub url: String,
    pub events: Vec<EventType>,
    pub has_secret: bool,
    pub custom_headers: BTreeMap<String, String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookView {
    fn from(webhook: Webhook) -> Self {
        Self {
            has_secret: webhook.signing_secret().is_some(),
            id: webhook.id,
            name: webhook.name,
            organization: webhook.organization,
            url: webhook.url,
            events: webhook.events,
            custom_headers: webhook.custom_headers,
            is_active: webhook.is_active,
            created_at: webhook.created_at,
        }
    }
}

pub async fn list_webhooks(State(state): State<AppState>) -> Result<Json<Vec<WebhookView>>> {
    let webhooks = state.dispatcher.store().list_webhooks()?;
    Ok(Json(webhooks.into_iter().map(WebhookView::from).collect()))
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Json(form): Json<WebhookForm>,
) -> Result<(StatusCode, Json<WebhookView>)> {
    let new = form.validate(state.config.allow_http_urls)?;
    let webhook = state.dispatcher.store().insert_webhook(new)?;

    info!(
        webhook_id = webhook.id,
        organization_id = ?webhook.organization_id(),
        event_count = webhook.events.len(),
        has_secret = webhook.signing_secret().is_some(),
        "webhook_created"
    );

    Ok((StatusCode::CREATED, Json(webhook.into())))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<WebhookView>> {
    Ok(Json(state.dispatcher.store().get_webhook(id)?.into()))
}

/// Replace a webhook's editable fields.
///
/// The owning organization cannot change, and an omitted secret keeps the
/// current one since clients never see it.
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(form): Json<WebhookForm>,
) -> Result<Json<WebhookView>> {
    let store = state.dispatcher.store();
    let existing = store.get_webhook(id)?;

    let mut update = form.validate(state.config.allow_http_urls)?;
    update.organization = existing.organization;
    if update.secret.is_none() {
        update.secret = existing.secret;
    }

    let webhook = store.update_webhook(id, update)?;
    info!(webhook_id = id, is_active = webhook.is_active, "webhook_updated");

    Ok(Json(webhook.into()))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.dispatcher.store().delete_webhook(id)?;
    info!(webhook_id = id, "webhook_deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_webhook(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<WebhookView>> {
    let webhook = state.dispatcher.store().set_active(id, false)?;
    info!(webhook_id = id, "webhook_deactivated");
    Ok(Json(webhook.into()))
}

/// Secret returned once by `rotate-secret`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretResponse {
    pub id: u64,
    pub secret: String,
}

pub async fn rotate_secret(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<SecretResponse>> {
    let store = state.dispatcher.store();

    let mut update = NewWebhook::from(store.get_webhook(id)?);
    let secret = generate_secret();
    update.secret = Some(secret.clone());
    store.update_webhook(id, update)?;

    info!(webhook_id = id, "webhook_secret_rotated");
    Ok(Json(SecretResponse { id, secret }))
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub limit: Option<usize>,
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<Json<Vec<WebhookDelivery>>> {
    let store = state.dispatcher.store();
    store.get_webhook(id)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .clamp(1, MAX_DELIVERY_LIMIT);

    Ok(Json(store.list_deliveries(id, limit)?))
}

/// Send one test delivery and return the finished row.
pub async fn test_webhook(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(form): Json<WebhookTestForm>,
) -> Result<Json<WebhookDelivery>> {
    let (event, payload) = form.validate()?;
    let webhook = state.dispatcher.store().get_webhook(id)?;

    let delivery = state.dispatcher.send_test(&webhook, event, &payload).await?;
    Ok(Json(delivery))
}

// =============================================================================
// Settings
// =============================================================================

/// Dispatch settings as exposed over the API, durations in whole seconds.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingsView {
    pub webhooks_enabled: bool,
    pub include_global_webhooks: bool,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub deadline_secs: u64,
}

impl From<&DispatchSettings> for SettingsView {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            webhooks_enabled: settings.webhooks_enabled,
            include_global_webhooks: settings.include_global_webhooks,
            request_timeout_secs: settings.request_timeout.as_secs(),
            concurrency: settings.concurrency,
            deadline_secs: settings.deadline.as_secs(),
        }
    }
}

/// Partial settings update; omitted fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub webhooks_enabled: Option<bool>,
    pub include_global_webhooks: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub deadline_secs: Option<u64>,
}

impl SettingsUpdate {
    fn apply(self, mut settings: DispatchSettings) -> Result<DispatchSettings> {
        if let Some(enabled) = self.webhooks_enabled {
            settings.webhooks_enabled = enabled;
        }
        if let Some(include) = self.include_global_webhooks {
            settings.include_global_webhooks = include;
        }
        if let Some(secs) = self.request_timeout_secs {
            if secs == 0 {
                return Err(WebhookError::Validation(
                    "request_timeout_secs must be at least 1".to_string(),
                ));
            }
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err(WebhookError::Validation(
                    "concurrency must be at least 1".to_string(),
                ));
            }
            settings.concurrency = concurrency;
        }
        if let Some(secs) = self.deadline_secs {
            settings.deadline = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(SettingsView::from(&state.dispatcher.settings()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>> {
    let settings = update.apply(state.dispatcher.settings())?;
    let view = SettingsView::from(&settings);
    state.dispatcher.reload_settings(settings);
    Ok(Json(view))
}
