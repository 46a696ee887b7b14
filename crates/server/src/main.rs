mod app;
mod bootstrap;
mod conversions;
mod error;
mod health;
mod routing_api;
mod signature;
mod telephony;
mod twiml;

use std::time::Duration;

use anyhow::Result;
use dcx_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;

fn init_logging(config: &AppConfig) {
    use dcx_core::config::LogFormat::*;
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
    // Logging needs the loaded config, so config errors surface on stderr only.
    let config = bootstrap::load_config(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&address).await?;
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "dcx-server listening"
    );
    axum::serve(listener, app::router(app.state, app.db_pool.clone()))
        .with_graceful_shutdown(wait_for_shutdown(grace))
        .await?;

    app.db_pool.close().await;
    tracing::info!(event_name = "system.server.stopped", "dcx-server stopped");

    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            error = %error,
            "failed to listen for shutdown signal"
        );
        return;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        grace_secs = grace.as_secs(),
        "draining in-flight calls"
    );
    // In-flight webhooks get the grace period; anything slower is cut off.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(event_name = "system.server.forced_exit", "grace period elapsed");
        std::process::exit(0);
    });
}
