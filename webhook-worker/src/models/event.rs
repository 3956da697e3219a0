//! Event types a webhook can subscribe to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WebhookError;

/// Domain events broadcast to webhooks.
///
/// The wire form is the snake_case string (`"asset_created"`), which is also
/// what webhooks store in their subscription list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AssetCreated,
    AssetUpdated,
    AssetDeleted,
    PasswordCreated,
    PasswordUpdated,
    PasswordDeleted,
    PasswordAccessed,
    DocumentCreated,
    DocumentUpdated,
    DocumentDeleted,
    OrganizationCreated,
    OrganizationUpdated,
    UserCreated,
    UserUpdated,
    WebsiteDown,
    WebsiteUp,
    SslExpiring,
    DomainExpiring,
    RackUpdated,
    DiagramUpdated,
}

impl EventType {
    /// Every event type, in display order.
    pub const ALL: [EventType; 20] = [
        EventType::AssetCreated,
        EventType::AssetUpdated,
        EventType::AssetDeleted,
        EventType::PasswordCreated,
        EventType::PasswordUpdated,
        EventType::PasswordDeleted,
        EventType::PasswordAccessed,
        EventType::DocumentCreated,
        EventType::DocumentUpdated,
        EventType::DocumentDeleted,
        EventType::OrganizationCreated,
        EventType::OrganizationUpdated,
        EventType::UserCreated,
        EventType::UserUpdated,
        EventType::WebsiteDown,
        EventType::WebsiteUp,
        EventType::SslExpiring,
        EventType::DomainExpiring,
        EventType::RackUpdated,
        EventType::DiagramUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AssetCreated => "asset_created",
            EventType::AssetUpdated => "asset_updated",
            EventType::AssetDeleted => "asset_deleted",
            EventType::PasswordCreated => "password_created",
            EventType::PasswordUpdated => "password_updated",
            EventType::PasswordDeleted => "password_deleted",
            EventType::PasswordAccessed => "password_accessed",
            EventType::DocumentCreated => "document_created",
            EventType::DocumentUpdated => "document_updated",
            EventType::DocumentDeleted => "document_deleted",
            EventType::OrganizationCreated => "organization_created",
            EventType::OrganizationUpdated => "organization_updated",
            EventType::UserCreated => "user_created",
            EventType::UserUpdated => "user_updated",
            EventType::WebsiteDown => "website_down",
            EventType::WebsiteUp => "website_up",
            EventType::SslExpiring => "ssl_expiring",
            EventType::DomainExpiring => "domain_expiring",
            EventType::RackUpdated => "rack_updated",
            EventType::DiagramUpdated => "diagram_updated",
        }
    }

    /// Look up an event type by its wire string. Matching is exact.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| WebhookError::UnknownEvent(s.to_string()))
    }
}
