//! Queue module for RabbitMQ operations.
//!
//! Application code publishes domain events to the `webhook_events` queue;
//! the webhook service consumes them and dispatches each one.
//!
//! ```text
//! Emitter → Publisher → webhook_events → consumer → Dispatcher → webhooks
//! ```

pub mod consumer;
pub mod publisher;
pub mod types;

pub use publisher::Publisher;
pub use types::{EventMessage, EVENTS_QUEUE};
