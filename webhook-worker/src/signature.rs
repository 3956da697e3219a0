//! Webhook payload signing.
//!
//! Outbound payloads are signed with HMAC-SHA256 keyed by the webhook's
//! shared secret. The signature is sent in the `X-Webhook-Signature` header as
//! `sha256=<hex digest>`.
//!
//! The envelope carries its own `timestamp`, so receivers that want replay
//! protection can use [`verify_signature_with_tolerance`] to reject stale
//! envelopes.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying the digest algorithm in the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign a JSON payload with a shared secret.
///
/// Returns `sha256=` followed by the 64-character lowercase hex digest of
/// HMAC-SHA256(secret, payload).
pub fn sign_payload(payload_json: &str, secret: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload_json.as_bytes());

    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature produced by [`sign_payload`].
///
/// The comparison runs in constant time and only an exact match (prefix and
/// lowercase digest) is accepted.
pub fn verify_signature(payload_json: &str, signature: &str, secret: &str) -> bool {
    let expected = sign_payload(payload_json, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Verify a signature and reject envelopes whose `timestamp` is more than
/// `max_age_seconds` away from the current time.
///
/// The timestamp is read from the signed envelope itself, so it cannot be
/// altered without invalidating the signature.
pub fn verify_signature_with_tolerance(
    payload_json: &str,
    signature: &str,
    secret: &str,
    max_age_seconds: u64,
) -> bool {
    if !verify_signature(payload_json, signature, secret) {
        warn!(
            payload_length = payload_json.len(),
            signature_length = signature.len(),
            "webhook_signature_mismatch"
        );
        return false;
    }

    let timestamp = serde_json::from_str::<serde_json::Value>(payload_json)
        .ok()
        .and_then(|v| v.get("timestamp").and_then(|t| t.as_i64()));

    let webhook_time = match timestamp {
        Some(t) => t,
        None => {
            warn!("webhook_signature_missing_timestamp");
            return false;
        }
    };

    let current_time = Utc::now().timestamp();
    let age = current_time.abs_diff(webhook_time);

    if age > max_age_seconds {
        warn!(
            webhook_time = webhook_time,
            current_time = current_time,
            age_seconds = age,
            max_age_seconds = max_age_seconds,
            "webhook_signature_stale"
        );
        return false;
    }

    true
}
