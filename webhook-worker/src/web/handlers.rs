//! Public endpoint handlers: health and event ingestion.
//!
//! Event ingestion stays fast: with a broker configured the event is
//! enqueued and the consumer dispatches it; without one, dispatch runs in a
//! spawned task. Either way the caller gets `202 Accepted` right away.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::delivery::Dispatcher;
use crate::error::{Result, WebhookError};
use crate::models::{EventType, Organization};
use crate::queue::{EventMessage, Publisher};
use crate::tasks::BackgroundTasks;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    /// `None` when no broker is configured
    pub publisher: Option<Publisher>,
    /// Dispatches started by `/events` without a broker
    pub background: BackgroundTasks,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher, publisher: Option<Publisher>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            publisher,
            background: BackgroundTasks::new(),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Event Ingestion
// =============================================================================

/// Event submitted by application code.
///
/// The event type is taken as a plain string so unknown names get a proper
/// error body instead of a generic deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub organization: Option<Organization>,
}

/// Response for accepted events.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

/// Event ingestion endpoint.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let event: EventType = request.event.trim().parse()?;
    let message = EventMessage::new(event, request.data, request.organization);

    info!(
        event = %event,
        organization_id = ?message.organization.as_ref().map(|o| o.id),
        queued = state.publisher.is_some(),
        "event_received"
    );

    match &state.publisher {
        Some(publisher) => {
            if let Err(e) = publisher.publish_event(&message).await {
                error!(event = %event, error = %e, "event_publish_failed");
                return Err(WebhookError::Internal(
                    "Failed to enqueue event".to_string(),
                ));
            }
        }
        None => {
            let dispatcher = state.dispatcher.clone();
            state.background.spawn(async move {
                dispatcher
                    .dispatch(
                        message.event,
                        &message.data,
                        message.organization.as_ref(),
                    )
                    .await;
            });
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { status: "accepted" }),
    ))
}
