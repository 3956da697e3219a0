//! HuduGlue webhooks - outbound webhook delivery for HuduGlue events.
//!
//! This library backs two binaries:
//! - `huduglue-webhooks`: consumes events, delivers them to subscribed
//!   webhooks and serves the admin API
//! - `huduglue-emit`: publishes a single event to the queue
//!
//! ## Architecture
//!
//! ```text
//! App → POST /events | huduglue-emit → webhook_events → Dispatcher → webhook URLs
//!                                                          ↓
//!                                                   delivery log (store)
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod models;
pub mod queue;
pub mod signature;
pub mod store;
pub mod tasks;
pub mod validation;
pub mod web;

// Re-export commonly used types
pub use config::{Config, DispatchSettings};
pub use delivery::{DeliveryRecorder, Dispatcher};
pub use error::{Result, WebhookError};
pub use models::{
    DeliveryStatus, EventType, NewWebhook, Organization, Webhook, WebhookDelivery,
};
pub use queue::{EventMessage, Publisher, EVENTS_QUEUE};
pub use signature::{sign_payload, verify_signature, verify_signature_with_tolerance};
pub use store::{FileStore, MemoryStore, WebhookStore};
pub use tasks::BackgroundTasks;
pub use validation::{WebhookForm, WebhookTestForm};
pub use web::AppState;
