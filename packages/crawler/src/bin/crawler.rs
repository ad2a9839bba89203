//! Crawler process
//!
//! Registers every configured job and drives the scheduler until Ctrl-C or
//! SIGTERM, then lets running jobs finish within the grace period.

use anyhow::{Context, Result};
use crawler_core::jobs::build_scheduler;
use crawler_core::kernel::CrawlerDeps;
use crawler_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawler_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting crawler");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        backend = %config.base_api_url,
        interval_minutes = config.crawl_interval_minutes,
        offset = %config.schedule_offset,
        postings = config.mofa_url.is_some(),
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let deps = CrawlerDeps::from_config(&config, shutdown.clone())?;
    let scheduler = build_scheduler(&config, &deps).context("Failed to register jobs")?;

    tokio::spawn(wait_for_signal(shutdown.clone()));
    scheduler.run(shutdown).await;

    tracing::info!("Crawler stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
