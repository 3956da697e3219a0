//! Outbound request construction: the JSON envelope and its headers.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::warn;

use super::DeliveryError;
use crate::models::{EventType, Webhook};

/// User agent sent with every webhook request.
pub const WEBHOOK_USER_AGENT: &str = "HuduGlue-Webhooks/1.0";

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Headers that custom webhook headers may not override (lowercase).
pub const RESERVED_HEADERS: [&str; 3] = ["content-type", "user-agent", SIGNATURE_HEADER];

pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// Body of every webhook request.
///
/// Field order is part of the wire format: receivers verify the signature
/// over the exact bytes sent.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub event: EventType,
    /// Unix seconds
    pub timestamp: i64,
    pub data: &'a serde_json::Value,
    pub webhook_id: u64,
    pub organization: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    pub fn new(webhook: &'a Webhook, event: EventType, data: &'a serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now().timestamp(),
            data,
            webhook_id: webhook.id,
            organization: webhook.organization_slug(),
        }
    }
}

/// Build the request headers for a webhook.
///
/// Custom headers go in first and protocol headers are set last, so
/// `Content-Type`, `User-Agent` and the signature always carry their
/// protocol values. Reserved custom headers are skipped with a warning.
pub fn build_headers(webhook: &Webhook, signature: Option<&str>) -> Result<HeaderMap, DeliveryError> {
    let mut headers = HeaderMap::new();

    for (name, value) in &webhook.custom_headers {
        if is_reserved_header(name) {
            warn!(
                webhook_id = webhook.id,
                header = %name,
                "webhook_reserved_header_skipped"
            );
            continue;
        }

        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| DeliveryError::InvalidHeader(format!("{name}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| DeliveryError::InvalidHeader(format!("{name}: {e}")))?;

        headers.insert(header_name, header_value);
    }

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(WEBHOOK_USER_AGENT));

    if let Some(signature) = signature {
        let value = HeaderValue::from_str(signature)
            .map_err(|e| DeliveryError::InvalidHeader(format!("{SIGNATURE_HEADER}: {e}")))?;
        headers.insert(HeaderName::from_static(SIGNATURE_HEADER), value);
    }

    Ok(headers)
}
