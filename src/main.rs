//! Lifecycle governor host process.
//!
//! ```text
//! load config → logging/metrics → bind → on_startup
//!     → serve diagnostics ... SIGINT/SIGTERM
//!     → on_shutdown (stop server, drain tasks) → exit
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use lifecycle_governor::{
    config, lifecycle::signals, observability, Governor, GovernorError, HttpServer,
};

#[derive(Parser)]
#[command(name = "lifecycle-governor")]
#[command(about = "Background task governor with diagnostics endpoints", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "GOVERNOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), GovernorError> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    observability::logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "lifecycle-governor starting"
    );

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            observability::metrics::init_metrics(addr)?;
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| GovernorError::Bind {
            address: bind_address.clone(),
            source,
        })?;

    let governor = Governor::new(config);
    governor.on_startup();

    let server = HttpServer::new(governor.clone());
    let server_task = tokio::spawn(server.run(listener, governor.shutdown().subscribe()));

    match signals::wait_for_signal().await {
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Signal handler unavailable, shutting down"),
    }

    let report = governor.on_shutdown().await;
    tracing::info!(
        completed = report.completed,
        cancelled = report.cancelled,
        failed = report.failed.len(),
        abandoned = report.abandoned.len(),
        timed_out = report.timed_out,
        "Background tasks drained"
    );

    match server_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "HTTP server task ended abnormally"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
