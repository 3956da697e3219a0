//! Configuration module for environment variable parsing.
//!
//! All settings come from environment variables; anything unset or invalid
//! falls back to its default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default per-request timeout for webhook POSTs, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// RabbitMQ connection URL. The event consumer is disabled when unset.
    pub cloudamqp_url: Option<String>,

    /// Port for the HTTP server to listen on
    pub port: u16,

    /// Directory holding the webhook and delivery tables
    pub data_dir: PathBuf,

    /// Global webhook switch
    pub webhooks_enabled: bool,

    /// Also deliver org-scoped events to global webhooks
    pub include_global_webhooks: bool,

    /// Per-request timeout for webhook POSTs, in seconds
    pub request_timeout_secs: u64,

    /// Maximum number of deliveries in flight for one event
    pub dispatch_concurrency: usize,

    /// Deadline for starting all deliveries of one event, in seconds
    pub dispatch_deadline_secs: u64,

    /// Accept plain http:// webhook URLs
    pub allow_http_urls: bool,

    /// Bearer token required by the admin API, if set
    pub admin_token: Option<String>,

    /// RabbitMQ prefetch for the event consumer
    pub worker_prefetch: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            cloudamqp_url: env::var("CLOUDAMQP_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            port: parse_var("PORT", 8080),

            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),

            webhooks_enabled: parse_bool("WEBHOOKS_ENABLED", true),

            include_global_webhooks: parse_bool("WEBHOOKS_INCLUDE_GLOBAL", false),

            request_timeout_secs: parse_var("WEBHOOK_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),

            dispatch_concurrency: parse_var::<usize>("DISPATCH_CONCURRENCY", 4).max(1),

            dispatch_deadline_secs: parse_var("DISPATCH_DEADLINE_SECS", 120),

            allow_http_urls: parse_bool("WEBHOOK_ALLOW_HTTP", false),

            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            worker_prefetch: parse_var("WORKER_PREFETCH", 32),
        }
    }

    /// The settings snapshot handed to the dispatcher.
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            webhooks_enabled: self.webhooks_enabled,
            include_global_webhooks: self.include_global_webhooks,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            concurrency: self.dispatch_concurrency,
            deadline: Duration::from_secs(self.dispatch_deadline_secs),
        }
    }
}

/// Settings the dispatcher reads on every dispatch.
///
/// A snapshot is injected at construction time and replaced wholesale on
/// reload, so a dispatch in progress always sees one consistent version.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub webhooks_enabled: bool,
    pub include_global_webhooks: bool,
    pub request_timeout: Duration,
    pub concurrency: usize,
    pub deadline: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            webhooks_enabled: true,
            include_global_webhooks: false,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: 4,
            deadline: Duration::from_secs(120),
        }
    }
}

/// Parse a variable with `FromStr`, warning when it is set but invalid.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag such as "true", "1", "yes" or "off".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}
