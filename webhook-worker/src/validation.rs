//! Validation of webhook forms submitted by organization administrators.
//!
//! The data layer trusts what it is given; this is where webhook invariants
//! are enforced:
//! - the URL is a usable http(s) URL
//! - events come from the fixed enumeration and are non-empty when active
//! - custom headers form a JSON object of strings and leave reserved
//!   protocol headers alone

use std::collections::BTreeMap;

use rand::RngCore;
use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;

use crate::delivery::is_reserved_header;
use crate::error::{Result, WebhookError};
use crate::models::{EventType, NewWebhook, Organization};

/// Webhook create/edit form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookForm {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// JSON object of header name to value; either an object or a string
    /// holding one.
    #[serde(default)]
    pub custom_headers: Option<serde_json::Value>,
    #[serde(default)]
    pub organization: Option<Organization>,
}

fn default_active() -> bool {
    true
}

impl WebhookForm {
    /// Validate the form into a [`NewWebhook`].
    pub fn validate(self, allow_http: bool) -> Result<NewWebhook> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(WebhookError::Validation("Name is required".to_string()));
        }

        let url = self.url.trim().to_string();
        validate_webhook_url(&url, allow_http)?;

        let events = validate_events(&self.events)?;
        if self.is_active && events.is_empty() {
            return Err(WebhookError::Validation(
                "Select at least one event for an active webhook".to_string(),
            ));
        }

        let custom_headers = clean_custom_headers(self.custom_headers.as_ref())?;

        let secret = self
            .secret
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(NewWebhook {
            name,
            organization: self.organization,
            url,
            events,
            secret,
            custom_headers,
            is_active: self.is_active,
        })
    }
}

/// Validate a webhook destination URL: parseable, `https` (or `http` when
/// allowed), and with a host.
pub fn validate_webhook_url(url: &str, allow_http: bool) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(WebhookError::InvalidUrl("URL must have a host".to_string()));
    }

    Ok(())
}

/// Parse event strings, rejecting unknown ones and dropping duplicates while
/// keeping the submitted order.
pub fn validate_events(events: &[String]) -> Result<Vec<EventType>> {
    let mut parsed = Vec::with_capacity(events.len());
    for raw in events {
        let event: EventType = raw.trim().parse()?;
        if !parsed.contains(&event) {
            parsed.push(event);
        }
    }
    Ok(parsed)
}

/// Normalize the custom headers field into a header map.
///
/// Accepts nothing, `null`, an empty string, a JSON object, or a string
/// containing a JSON object. Values must be strings.
pub fn clean_custom_headers(raw: Option<&serde_json::Value>) -> Result<BTreeMap<String, String>> {
    let parsed;
    let object = match raw {
        None | Some(serde_json::Value::Null) => return Ok(BTreeMap::new()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(BTreeMap::new()),
        Some(serde_json::Value::String(s)) => {
            parsed = serde_json::from_str::<serde_json::Value>(s)
                .map_err(|e| WebhookError::Validation(format!("Invalid JSON: {e}")))?;
            &parsed
        }
        Some(value) => value,
    };

    let map = object.as_object().ok_or_else(|| {
        WebhookError::Validation(
            "Custom headers must be a JSON object (dictionary).".to_string(),
        )
    })?;

    let mut headers = BTreeMap::new();
    for (name, value) in map {
        let value = value.as_str().ok_or_else(|| {
            WebhookError::Validation(format!("Custom header {name} must be a string"))
        })?;

        if is_reserved_header(name) {
            return Err(WebhookError::ReservedHeader(name.clone()));
        }
        HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
            WebhookError::Validation(format!("Invalid header name: {name}"))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            WebhookError::Validation(format!("Invalid value for header {name}"))
        })?;

        headers.insert(name.trim().to_string(), value.to_string());
    }

    Ok(headers)
}

/// Form for sending a test delivery to one webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookTestForm {
    pub test_event: String,
    /// JSON payload, either inline or as a string; defaults to a canned
    /// test message when absent or blank.
    #[serde(default)]
    pub test_payload: Option<serde_json::Value>,
}

impl WebhookTestForm {
    pub fn validate(self) -> Result<(EventType, serde_json::Value)> {
        let event: EventType = self.test_event.trim().parse()?;

        let payload = match self.test_payload {
            None | Some(serde_json::Value::Null) => default_test_payload(),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => default_test_payload(),
            Some(serde_json::Value::String(s)) => serde_json::from_str(&s)
                .map_err(|e| WebhookError::Validation(format!("Invalid JSON: {e}")))?,
            Some(value) => value,
        };

        Ok((event, payload))
    }
}

fn default_test_payload() -> serde_json::Value {
    serde_json::json!({"test": true, "message": "Test webhook delivery"})
}

/// Generate a random signing secret (32 bytes, hex-encoded).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
