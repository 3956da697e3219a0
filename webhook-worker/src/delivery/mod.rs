//! Outbound webhook delivery.
//!
//! ```text
//! event → Dispatcher → (envelope, signature, headers) → DeliveryRecorder::begin
//!       → HTTP POST → DeliveryRecorder::complete | DeliveryRecorder::fail
//! ```

pub mod dispatcher;
pub mod recorder;
pub mod request;

use std::time::Duration;

pub use dispatcher::Dispatcher;
pub use recorder::DeliveryRecorder;
pub use request::{
    build_headers, is_reserved_header, Envelope, RESERVED_HEADERS, SIGNATURE_HEADER,
    WEBHOOK_USER_AGENT,
};

/// Maximum stored length of a response body, in characters.
pub const MAX_RESPONSE_BODY_CHARS: usize = 1000;

/// Maximum stored length of an error message, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Bytes of a response body read before the rest is discarded. Enough for
/// `MAX_RESPONSE_BODY_CHARS` characters of any UTF-8 text.
pub const MAX_RESPONSE_BODY_BYTES: usize = 4 * MAX_RESPONSE_BODY_CHARS;

/// Why a delivery attempt produced no usable HTTP response.
///
/// The `Display` output is what ends up in `WebhookDelivery::error_message`.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Transport(String),

    #[error("Unexpected error: invalid header {0}")]
    InvalidHeader(String),
}

impl DeliveryError {
    /// Classify a reqwest error.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout(timeout.as_secs())
        } else if err.is_connect() {
            DeliveryError::Connect(err.to_string())
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Start of a response body, collected chunk by chunk up to a byte limit.
#[derive(Debug)]
pub struct BodyPrefix {
    buf: Vec<u8>,
    limit: usize,
}

impl BodyPrefix {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(8 * 1024)),
            limit,
        }
    }

    /// Keep as much of `chunk` as fits. Returns `false` once the limit is
    /// reached and further chunks would be ignored.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..room.min(chunk.len())]);
        self.buf.len() < self.limit
    }

    /// Lossy UTF-8 decode; a character split at the limit becomes U+FFFD.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Truncate to at most `max` characters, never splitting a character.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
