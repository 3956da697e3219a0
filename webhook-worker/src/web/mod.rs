//! HTTP surface: event ingestion plus the admin API.
//!
//! ```text
//! GET  /health
//! POST /events
//! GET  /admin/webhooks                     POST /admin/webhooks
//! GET  /admin/webhooks/:id                 PUT, DELETE
//! POST /admin/webhooks/:id/deactivate
//! POST /admin/webhooks/:id/rotate-secret
//! POST /admin/webhooks/:id/test
//! GET  /admin/webhooks/:id/deliveries?limit=
//! GET  /admin/settings                     PUT /admin/settings
//! ```
//!
//! Everything except `/health` requires `Authorization: Bearer <ADMIN_TOKEN>`
//! when a token is configured. `/events` is guarded too: an accepted event is
//! signed with the subscribers' secrets, so submitting one is privileged.

pub mod admin;
pub mod handlers;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::WebhookError;

pub use admin::{SecretResponse, SettingsView, WebhookView};
pub use handlers::{health, ingest_event, AcceptedResponse, AppState, EventRequest, HealthResponse};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/webhooks",
            get(admin::list_webhooks).post(admin::create_webhook),
        )
        .route(
            "/webhooks/:id",
            get(admin::get_webhook)
                .put(admin::update_webhook)
                .delete(admin::delete_webhook),
        )
        .route("/webhooks/:id/deactivate", post(admin::deactivate_webhook))
        .route("/webhooks/:id/rotate-secret", post(admin::rotate_secret))
        .route("/webhooks/:id/test", post(admin::test_webhook))
        .route("/webhooks/:id/deliveries", get(admin::list_deliveries))
        .route(
            "/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let events = post(ingest_event)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .route("/events", events)
        .nest("/admin", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, WebhookError> {
    if let Some(expected) = state.config.admin_token.as_deref() {
        let provided = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");

        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            warn!(
                path = %request.uri().path(),
                has_authorization = request.headers().contains_key(AUTHORIZATION),
                "auth_rejected"
            );
            return Err(WebhookError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}
