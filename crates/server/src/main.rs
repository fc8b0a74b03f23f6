mod bootstrap;
mod health;
mod jobs;
mod rpc;

use std::time::Duration;

use anyhow::Result;
use procura_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use procura_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let job_runner = if app.config.scheduler.enabled {
        let runner = jobs::JobRunner::from_config(&app.config.scheduler, app.scheduler.clone())?;
        Some(runner.spawn())
    } else {
        tracing::info!(
            event_name = "scheduler.disabled",
            correlation_id = "bootstrap",
            "scheduler disabled by configuration"
        );
        None
    };

    let router = health::router(health::HealthState::new(app.db_pool.clone(), app.config.scheduler.enabled))
        .merge(rpc::router(rpc::RpcState {
            workflow: app.workflow.clone(),
            scheduler: app.scheduler.clone(),
            vendors: app.vendors.clone(),
        }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "procura-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "procura-server stopping"
    );
    if let Some(handle) = job_runner {
        handle.abort();
    }
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
