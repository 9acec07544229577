mod bootstrap;
mod dispatch;
mod health;
mod invoice;
mod mailer;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ferrobot_core::config::LoadOptions;

use crate::webhook::WebhookState;

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let filter = EnvFilter::try_from_env("FERROBOT_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();

    let app = bootstrap::bootstrap(LoadOptions::default())
        .await
        .context("startup configuration failed")?;

    let webhook_state = Arc::new(WebhookState {
        orchestrator: app.orchestrator.clone(),
        transport: app.transport_dyn(),
        secret: app.config.telegram.webhook_secret.clone(),
        request_timeout: Duration::from_secs(app.config.server.request_timeout_secs),
    });

    let router = webhook::router(webhook_state).merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    info!(
        event_name = "system.server.started",
        bind_address = %address,
        "ferrobot-server listening"
    );

    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_grace))
        .await
        .context("server terminated unexpectedly")?;

    info!(event_name = "system.server.stopped", "ferrobot-server stopped cleanly");
    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    let _ = tokio::signal::ctrl_c().await;
    info!(
        event_name = "system.server.stopping",
        grace_secs = grace.as_secs(),
        "shutdown signal received, draining"
    );
    tokio::time::sleep(grace.min(Duration::from_secs(1))).await;
}
