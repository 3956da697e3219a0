//! HuduGlue webhook service.
//!
//! Consumes domain events from the `webhook_events` queue (when a broker is
//! configured), delivers them to subscribed webhooks, and serves the event
//! ingestion endpoint plus the admin API. SIGHUP reloads dispatch settings
//! from the environment.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use huduglue::queue::consumer;
use huduglue::web::{self, AppState};
use huduglue::{Config, Dispatcher, FileStore, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("webhook_service_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        rabbitmq_configured = config.cloudamqp_url.is_some(),
        admin_auth_configured = config.admin_token.is_some(),
        webhooks_enabled = config.webhooks_enabled,
        include_global_webhooks = config.include_global_webhooks,
        request_timeout_secs = config.request_timeout_secs,
        dispatch_concurrency = config.dispatch_concurrency,
        dispatch_deadline_secs = config.dispatch_deadline_secs,
        allow_http_urls = config.allow_http_urls,
        "config_loaded"
    );

    if config.admin_token.is_none() {
        warn!("admin_token_not_configured");
    }

    let store = Arc::new(FileStore::open(&config.data_dir).context("Failed to open store")?);
    let dispatcher = Dispatcher::new(store, config.dispatch_settings())
        .context("Failed to create dispatcher")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the queue consumer and the matching publisher for /events
    let (publisher, consumer_task) = match config.cloudamqp_url.clone() {
        Some(url) => {
            let publisher = Publisher::new(url.clone());
            let prefetch = config.worker_prefetch;
            let dispatcher = dispatcher.clone();
            let shutdown = wait_for(shutdown_rx.clone());

            let task = tokio::spawn(async move {
                if let Err(e) = consumer::run(&url, prefetch, dispatcher, shutdown).await {
                    error!(error = %e, "rabbitmq_consumer_failed");
                }
            });

            (Some(publisher), Some(task))
        }
        None => {
            info!("rabbitmq_not_configured");
            (None, None)
        }
    };

    tokio::spawn(reload_on_hangup(dispatcher.clone()));

    let state = AppState::new(config.clone(), dispatcher, publisher.clone());
    let background = state.background.clone();
    let app = web::router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let dispatches started by /events finish their deliveries
    background.drain().await;

    // Stop the consumer; it drains its own dispatches before closing
    let _ = shutdown_tx.send(true);
    if let Some(task) = consumer_task {
        if let Err(e) = task.await {
            error!(error = %e, "rabbitmq_consumer_join_failed");
        }
    }

    if let Some(publisher) = publisher {
        publisher.close().await;
    }

    info!("webhook_service_shutdown_complete");

    Ok(())
}

/// Resolve once the shutdown flag flips (or its sender is dropped).
async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("webhook_service_shutting_down");
}

/// Re-read dispatch settings from the environment on every SIGHUP.
#[cfg(unix)]
async fn reload_on_hangup(dispatcher: Dispatcher) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "sighup_handler_failed");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Received SIGHUP");
        dispatcher.reload_settings(Config::from_env().dispatch_settings());
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_dispatcher: Dispatcher) {}
