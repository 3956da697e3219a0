//! Shared fixtures for the integration tests.
//!
//! Deliveries go to wiremock servers, which listen on plain http, so every
//! config built here allows http webhook URLs.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use huduglue::{
    Config, DispatchSettings, Dispatcher, EventType, MemoryStore, NewWebhook, Organization,
    Webhook, WebhookStore,
};

pub const SECRET: &str = "abc123";

/// Address with nothing listening; connections are refused immediately.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9/hook";

/// Settings with a short request timeout so slow-endpoint tests stay quick.
pub fn fast_settings() -> DispatchSettings {
    DispatchSettings {
        request_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

pub fn dispatcher(settings: DispatchSettings) -> (Arc<MemoryStore>, Dispatcher) {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone(), settings).expect("dispatcher");
    (store, dispatcher)
}

/// Builder-style fixture for webhook rows.
pub struct WebhookFixture {
    new: NewWebhook,
}

impl WebhookFixture {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            new: NewWebhook {
                name: "Test webhook".to_string(),
                organization: None,
                url: url.into(),
                events: vec![EventType::AssetCreated],
                secret: None,
                custom_headers: BTreeMap::new(),
                is_active: true,
            },
        }
    }

    pub fn events(mut self, events: &[EventType]) -> Self {
        self.new.events = events.to_vec();
        self
    }

    pub fn secret(mut self, secret: &str) -> Self {
        self.new.secret = Some(secret.to_string());
        self
    }

    pub fn organization(mut self, id: u64, slug: &str) -> Self {
        self.new.organization = Some(Organization::new(id, Some(slug.to_string())));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.new
            .custom_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.new.is_active = false;
        self
    }

    pub fn insert(self, store: &dyn WebhookStore) -> Webhook {
        store.insert_webhook(self.new).expect("insert webhook")
    }
}

pub fn test_config(admin_token: Option<&str>) -> Config {
    Config {
        cloudamqp_url: None,
        port: 0,
        data_dir: PathBuf::from("./data"),
        webhooks_enabled: true,
        include_global_webhooks: false,
        request_timeout_secs: 1,
        dispatch_concurrency: 4,
        dispatch_deadline_secs: 120,
        allow_http_urls: true,
        admin_token: admin_token.map(|t| t.to_string()),
        worker_prefetch: 32,
    }
}
