//! Lifeline -- crisis risk detection and escalation for journaling apps.
//!
//! This crate scores journal text for safety risk, maps the severity onto a
//! time-phased escalation plan, and drives that plan: in-app support content,
//! notifications to responders with acknowledgment deadlines and fallback,
//! and an audit record that never contains the user's text.

pub mod api;
pub mod clock;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod engine;
pub mod escalation;
pub mod intervention;
pub mod resources;
pub mod responders;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::config::LifelineConfig;

/// Start the lifeline daemon: engine plus HTTP API.
pub async fn serve(config: LifelineConfig) -> Result<()> {
    let bind = config.server.bind.clone();
    let engine = Arc::new(engine::Engine::builder(config).build()?);
    tracing::info!(
        responders = engine.directory().len().await,
        "escalation engine ready"
    );

    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(api::state::AppState::new(engine));

    tracing::info!(%addr, "lifeline listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
