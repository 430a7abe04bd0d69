//! # Mitm-Relay Server
//!
//! Main entry point for the mitm-relay proxy server.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use mitm_relay_api::create_router;
use mitm_relay_core::{Config, LoggingConfig, RelayContext, RelayServer, ReportFeed};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize logging
    let _guard = init_logging(&config.logging)?;

    info!(
        "Starting mitm-relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let feed = Arc::new(ReportFeed::new(config.logging.verbose));
    let control = config.control.clone();
    let ctx = RelayContext::new(config, feed.clone());

    let relay = RelayServer::bind(ctx.clone())
        .await
        .context("Failed to start relay listener")?;
    let relay_handle = tokio::spawn(relay.run());

    // Start status endpoint
    let control_handle = if control.enabled {
        let control_addr = format!("{}:{}", control.host, control.port);
        let listener = tokio::net::TcpListener::bind(&control_addr)
            .await
            .with_context(|| format!("Failed to bind status endpoint {}", control_addr))?;
        let router = create_router(Arc::clone(&ctx.stats), feed);
        info!("Listening for status requests on http://{}/status/report", control_addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Status endpoint error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::select! {
        result = relay_handle => match result {
            Ok(Ok(())) => info!("Relay stopped"),
            Ok(Err(e)) => error!("Relay stopped accepting: {}", e),
            Err(e) => error!("Relay task failed: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    if let Some(handle) = control_handle {
        handle.abort();
    }

    info!("Mitm-relay shutting down");
    Ok(())
}

/// Defaults, then the config file, then command-line flags.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(&args.overrides());
    config.validate().context("Remote host (-r host:port) required")?;
    Ok(config)
}

/// Console plus daily-rotating file output.
fn init_logging(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.directory)
        .with_context(|| format!("Failed to create log directory: {}", logging.directory))?;

    let file_appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}
