//! CalGPT application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialise tracing
//! 3. Build the shared state (process invoker, parser, admission, sessions)
//! 4. Start the session purge task
//! 5. Serve the axum API until Ctrl-C

mod cli;

use std::time::Duration;

use clap::Parser;

use calgpt_api::routes;
use calgpt_api::state::AppState;
use crate::cli::{CliArgs, LoadedConfig};

/// How often idle sessions are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Resolves once Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. The filter level comes from it, so it is read before tracing.
    let LoadedConfig {
        path: config_file,
        config,
        load_error,
    } = args.load_config();

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting CalGPT v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load configuration, using defaults"
        ),
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    tracing::info!(
        program = %config.bridge.program,
        args = ?config.bridge.args,
        input_mode = ?config.bridge.input_mode,
        max_concurrent = config.bridge.max_concurrent,
        timeout_secs = config.bridge.timeout_secs,
        "Query bridge configured"
    );

    let state = AppState::new(config);

    // === Background tasks ===

    let store = state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            store.purge_expired();
        }
    });

    // === API server ===

    if let Err(e) = routes::start_server(state, shutdown_signal()).await {
        tracing::error!(error = %e, "API server failed");
        return Err(e.into());
    }

    Ok(())
}
