mod bootstrap;
mod calls;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mailvoice_agent::Orchestrator;
use mailvoice_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use mailvoice_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging reflects the loaded config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = calls::router(calls::CallsState::new(app.orchestrator.clone())).merge(
        health::router(health::HealthState::new(
            app.orchestrator.clone(),
            app.config.llm.provider.as_str(),
        )),
    );

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "mailvoice-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(app.orchestrator.clone(), grace))
        .await?;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "mailvoice-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown(orchestrator: Arc<Orchestrator>, grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for the shutdown signal"
        );
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_calls = orchestrator.active_call_count(),
        "mailvoice-server stopping"
    );
    let remaining = orchestrator.shutdown(grace).await;
    if remaining > 0 {
        tracing::warn!(
            event_name = "system.server.calls_abandoned",
            correlation_id = "shutdown",
            remaining,
            "stopping with calls still active"
        );
    }
}
