mod cli_config;
mod engine;
mod error;
mod logging;
mod runtime;
mod scheduler;
mod signals;
mod source;
mod state;
mod version;

use crate::cli_config::{Args, Config};
use crate::engine::UpdateEngine;
use crate::logging::setup_logging;
use crate::runtime::{CliRuntime, ContainerRuntime};
use crate::scheduler::Scheduler;
use crate::signals::ShutdownSignals;
use crate::source::{CatalogSource, InstanceSource, build_http_client};

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// =============================================================================
// Main Application
// =============================================================================

const EXIT_CONFIG_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let _guard = setup_logging(args.log_dir.as_deref(), &args.log_level)?;

    info!("Starting Plex Updater");

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
        }
    };
    info!(
        "Tracking {} channel for container {}, check interval: {} minutes",
        config.branch, config.container_name, config.interval_minutes
    );

    let runtime = CliRuntime::new(&config.runtime);
    match runtime.ping().await {
        Ok(server_version) => info!("Connected to {} {}", config.runtime, server_version),
        Err(e) => {
            error!("Failed to access the container runtime: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    let client = build_http_client(config.http_timeout)?;
    let latest = CatalogSource::new(
        client.clone(),
        &config.catalog_url,
        &config.branch,
        &config.token,
        &config.platform,
        &config.os,
    );
    let current = InstanceSource::new(
        client,
        &config.protocol,
        &config.host,
        config.port,
        &config.token,
    );

    let signals = match ShutdownSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let shutdown = CancellationToken::new();
    signals::spawn_shutdown_listener(signals, shutdown.clone());

    let engine = UpdateEngine::new(
        Box::new(latest),
        Box::new(current),
        Box::new(runtime),
        config.container_name.clone(),
        config.retry_delay,
        shutdown.clone(),
    );

    let mut scheduler = match Scheduler::new(engine, config.interval_minutes) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
        }
    };

    scheduler.run(config.force_update, shutdown).await;

    info!("Exiting...");
    Ok(ExitCode::SUCCESS)
}
