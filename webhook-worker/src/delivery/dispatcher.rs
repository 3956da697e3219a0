//! Event fan-out to subscribed webhooks.
//!
//! One event is delivered to every active, subscribed webhook through a
//! bounded pool of in-flight requests. Each delivery is isolated: whatever
//! happens to one webhook is recorded on its own delivery row and never
//! affects the others or the caller.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::{future, stream, StreamExt};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::request::{build_headers, Envelope};
use super::{BodyPrefix, DeliveryError, DeliveryRecorder, MAX_RESPONSE_BODY_BYTES};
use crate::config::DispatchSettings;
use crate::error::{Result, WebhookError};
use crate::models::{DeliveryStatus, EventType, Organization, Webhook, WebhookDelivery};
use crate::signature::sign_payload;
use crate::store::WebhookStore;

/// Dispatches events to webhooks.
///
/// Cheap to clone; clones share the store, HTTP client and settings.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    store: Arc<dyn WebhookStore>,
    recorder: DeliveryRecorder,
    client: Client,
    settings: RwLock<DispatchSettings>,
}

impl Dispatcher {
    /// Create a dispatcher with its own HTTP client.
    ///
    /// Redirects are not followed: a 3xx answer counts as a failed delivery.
    pub fn new(store: Arc<dyn WebhookStore>, settings: DispatchSettings) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(store, settings, client))
    }

    pub fn with_client(
        store: Arc<dyn WebhookStore>,
        settings: DispatchSettings,
        client: Client,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                recorder: DeliveryRecorder::new(store.clone()),
                store,
                client,
                settings: RwLock::new(settings),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn WebhookStore> {
        &self.inner.store
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> DispatchSettings {
        match self.inner.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the settings snapshot. Dispatches already running keep the
    /// snapshot they started with.
    pub fn reload_settings(&self, settings: DispatchSettings) {
        info!(
            webhooks_enabled = settings.webhooks_enabled,
            include_global_webhooks = settings.include_global_webhooks,
            request_timeout_secs = settings.request_timeout.as_secs(),
            concurrency = settings.concurrency,
            deadline_secs = settings.deadline.as_secs(),
            "dispatch_settings_reloaded"
        );

        match self.inner.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Deliver an event to every active webhook subscribed to it.
    ///
    /// With `organization` set, only that organization's webhooks are
    /// considered (plus global ones when `include_global_webhooks` is on).
    /// Returns the number of successful deliveries. Never fails: every
    /// problem is recorded on a delivery row or logged.
    pub async fn dispatch(
        &self,
        event: EventType,
        payload: &serde_json::Value,
        organization: Option<&Organization>,
    ) -> usize {
        let settings = self.settings();

        if !settings.webhooks_enabled {
            debug!(event = %event, "dispatch_disabled");
            return 0;
        }

        let candidates = match self.inner.store.active_webhooks(
            organization.map(|o| o.id),
            settings.include_global_webhooks,
        ) {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!(event = %event, error = %e, "dispatch_lookup_failed");
                return 0;
            }
        };

        let matching: Vec<Webhook> = candidates
            .into_iter()
            .filter(|w| w.subscribes_to(event))
            .collect();

        if matching.is_empty() {
            debug!(
                event = %event,
                organization_id = ?organization.map(|o| o.id),
                "dispatch_no_matching_webhooks"
            );
            return 0;
        }

        info!(
            event = %event,
            organization_id = ?organization.map(|o| o.id),
            webhook_count = matching.len(),
            concurrency = settings.concurrency,
            "dispatch_started"
        );

        let deadline = Instant::now() + settings.deadline;
        let timeout = settings.request_timeout;
        let attempted = matching.len();
        let payload = Arc::new(payload.clone());

        let delivered = stream::iter(matching)
            .map(|webhook| {
                let this = self.clone();
                let payload = payload.clone();
                async move {
                    this.deliver_before_deadline(&webhook, event, &payload, timeout, deadline)
                        .await
                }
            })
            .buffer_unordered(settings.concurrency.max(1))
            .fold(0usize, |count, success| future::ready(count + usize::from(success)))
            .await;

        info!(
            event = %event,
            attempted = attempted,
            delivered = delivered,
            "dispatch_complete"
        );

        delivered
    }

    /// Deliver one test event to a single webhook.
    ///
    /// Ignores the global switch, the active flag and the webhook's event
    /// subscriptions. Returns the finished delivery row.
    pub async fn send_test(
        &self,
        webhook: &Webhook,
        event: EventType,
        payload: &serde_json::Value,
    ) -> Result<WebhookDelivery> {
        info!(webhook_id = webhook.id, event = %event, "webhook_test_started");
        let timeout = self.settings().request_timeout;
        self.deliver(webhook, event, payload, timeout).await
    }

    async fn deliver_before_deadline(
        &self,
        webhook: &Webhook,
        event: EventType,
        payload: &serde_json::Value,
        timeout: Duration,
        deadline: Instant,
    ) -> bool {
        // Deliveries that have not started by the deadline are skipped
        // entirely; started ones are bounded by their own request timeout.
        if Instant::now() >= deadline {
            warn!(
                webhook_id = webhook.id,
                event = %event,
                "webhook_delivery_skipped_deadline"
            );
            return false;
        }

        match self.deliver(webhook, event, payload, timeout).await {
            Ok(record) => record.status == DeliveryStatus::Success,
            Err(e) => {
                error!(
                    webhook_id = webhook.id,
                    event = %event,
                    error = %e,
                    "webhook_delivery_error"
                );
                false
            }
        }
    }

    /// Sign, record and POST one event to one webhook.
    async fn deliver(
        &self,
        webhook: &Webhook,
        event: EventType,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<WebhookDelivery> {
        let envelope = Envelope::new(webhook, event, payload);
        let body = serde_json::to_string(&envelope)?;
        let snapshot = serde_json::to_value(&envelope)?;
        let signature = webhook
            .signing_secret()
            .map(|secret| sign_payload(&body, secret));

        let record = {
            let webhook = webhook.clone();
            self.record(move |recorder| recorder.begin(&webhook, event, snapshot))
                .await?
        };
        let delivery_id = record.id;

        let headers = match build_headers(webhook, signature.as_deref()) {
            Ok(headers) => headers,
            Err(e) => {
                error!(
                    webhook_id = webhook.id,
                    delivery_id = delivery_id,
                    error = %e,
                    "webhook_headers_invalid"
                );
                let outcome = Outcome::Failed {
                    message: e.to_string(),
                    duration_ms: None,
                };
                return self.finish(record, outcome).await;
            }
        };

        debug!(
            webhook_id = webhook.id,
            delivery_id = delivery_id,
            event = %event,
            url = %webhook.url,
            body_length = body.len(),
            has_signature = signature.is_some(),
            "webhook_request_starting"
        );

        let start = Instant::now();
        let result = self
            .inner
            .client
            .post(&webhook.url)
            .headers(headers)
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        let outcome = match result {
            Ok(response) => {
                let status = response.status().as_u16();
                match read_body_prefix(response).await {
                    Ok(text) => Outcome::Response {
                        status,
                        body: text,
                        duration_ms: elapsed_ms(start),
                    },
                    Err(e) => Outcome::Failed {
                        message: DeliveryError::from_reqwest(&e, timeout).to_string(),
                        duration_ms: Some(elapsed_ms(start)),
                    },
                }
            }
            Err(e) => Outcome::Failed {
                message: DeliveryError::from_reqwest(&e, timeout).to_string(),
                duration_ms: Some(elapsed_ms(start)),
            },
        };

        let record = match self.finish(record, outcome).await {
            Ok(record) => record,
            Err(e) => {
                // The outcome could not be persisted; try once more to leave
                // the stored row terminal rather than pending.
                let store = self.inner.store.clone();
                let message = format!("Unexpected error: {e}");
                let _ = self
                    .record(move |recorder| {
                        let mut stored = store.get_delivery(delivery_id)?;
                        if !stored.status.is_terminal() {
                            recorder.fail(&mut stored, &message, None)?;
                        }
                        Ok(())
                    })
                    .await;
                return Err(e);
            }
        };

        match record.status {
            DeliveryStatus::Success => info!(
                webhook_id = webhook.id,
                delivery_id = delivery_id,
                event = %event,
                status_code = ?record.response_code,
                duration_ms = ?record.duration_ms,
                "webhook_delivered"
            ),
            _ => warn!(
                webhook_id = webhook.id,
                delivery_id = delivery_id,
                event = %event,
                status_code = ?record.response_code,
                duration_ms = ?record.duration_ms,
                error = ?record.error_message,
                "webhook_delivery_failed"
            ),
        }

        Ok(record)
    }

    /// Move a pending row to its terminal state.
    async fn finish(&self, record: WebhookDelivery, outcome: Outcome) -> Result<WebhookDelivery> {
        self.record(move |recorder| {
            let mut record = record;
            match outcome {
                Outcome::Response {
                    status,
                    body,
                    duration_ms,
                } => recorder.complete(&mut record, status, &body, duration_ms)?,
                Outcome::Failed {
                    message,
                    duration_ms,
                } => recorder.fail(&mut record, &message, duration_ms)?,
            }
            Ok(record)
        })
        .await
    }

    /// Run a recorder write on the blocking pool; stores may do disk I/O.
    async fn record<T, F>(&self, write: F) -> Result<T>
    where
        F: FnOnce(&DeliveryRecorder) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let recorder = self.inner.recorder.clone();
        tokio::task::spawn_blocking(move || write(&recorder))
            .await
            .map_err(|e| WebhookError::Internal(format!("store task failed: {e}")))?
    }
}

/// How a delivery attempt ended.
enum Outcome {
    Response {
        status: u16,
        body: String,
        duration_ms: u64,
    },
    Failed {
        message: String,
        duration_ms: Option<u64>,
    },
}

/// Read at most [`MAX_RESPONSE_BODY_BYTES`] of the body and drop the rest.
async fn read_body_prefix(mut response: reqwest::Response) -> reqwest::Result<String> {
    let mut body = BodyPrefix::new(MAX_RESPONSE_BODY_BYTES);
    while let Some(chunk) = response.chunk().await? {
        if !body.push(&chunk) {
            break;
        }
    }
    Ok(body.into_string())
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
