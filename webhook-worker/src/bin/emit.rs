//! HuduGlue event emitter - publishes one domain event to the queue.
//!
//! Usage:
//!
//! ```text
//! huduglue-emit <event_type> [json_data] [org_id] [org_slug]
//! ```
//!
//! Requires `CLOUDAMQP_URL`.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use huduglue::{Config, EventMessage, EventType, Organization, Publisher};

const USAGE: &str = "usage: huduglue-emit <event_type> [json_data] [org_id] [org_slug]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let message = parse_args(&args)?;

    let config = Config::from_env();
    let url = config
        .cloudamqp_url
        .context("CLOUDAMQP_URL must be set to emit events")?;

    let publisher = Publisher::new(url);
    let result = publisher.publish_event(&message).await;
    publisher.close().await;
    result?;

    info!(
        event = %message.event,
        organization_id = ?message.organization.as_ref().map(|o| o.id),
        "event_emitted"
    );

    Ok(())
}

fn parse_args(args: &[String]) -> Result<EventMessage> {
    let Some(event) = args.first() else {
        bail!(USAGE);
    };
    if args.len() > 4 {
        bail!(USAGE);
    }

    let event: EventType = event.parse()?;

    let data = match args.get(1) {
        Some(raw) => serde_json::from_str(raw).context("json_data must be valid JSON")?,
        None => serde_json::json!({}),
    };

    let organization = match args.get(2) {
        Some(raw) => {
            let id: u64 = raw.parse().context("org_id must be a positive integer")?;
            Some(Organization::new(id, args.get(3).cloned()))
        }
        None => None,
    };

    Ok(EventMessage::new(event, data, organization))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_event_only() {
        let message = parse_args(&args(&["asset_created"])).unwrap();
        assert_eq!(message.event, EventType::AssetCreated);
        assert_eq!(message.data, serde_json::json!({}));
        assert!(message.organization.is_none());
    }

    #[test]
    fn test_parse_full() {
        let message =
            parse_args(&args(&["password_updated", r#"{"id": 9}"#, "3", "acme"])).unwrap();
        assert_eq!(message.data["id"], 9);
        assert_eq!(
            message.organization,
            Some(Organization::new(3, Some("acme".to_string())))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["asset_exploded"])).is_err());
        assert!(parse_args(&args(&["asset_created", "{not json"])).is_err());
        assert!(parse_args(&args(&["asset_created", "{}", "acme"])).is_err());
    }
}
