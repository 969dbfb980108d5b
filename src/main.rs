//! greet-server binary
//!
//! Binds the configured port and serves until the process is killed.

use greet_server::{Config, ServeMode, Server};
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        mode = ?config.mode,
        delay_ms = config.delay.as_millis() as u64,
        "Starting greet-server"
    );

    let runtime = build_runtime(&config)?;

    runtime.block_on(async {
        let server = Server::bind(&config).await.map_err(|e| {
            error!(error = %e, "Server failed to start");
            e
        })?;
        server.run().await
    })?;

    Ok(())
}

/// Sequential mode only ever drives one connection, so it gets a
/// current-thread runtime. Concurrent mode uses worker threads.
fn build_runtime(config: &Config) -> std::io::Result<Runtime> {
    match config.mode {
        ServeMode::Sequential => {
            info!("Using current-thread runtime");
            Builder::new_current_thread().enable_all().build()
        }
        ServeMode::Concurrent => {
            let mut builder = Builder::new_multi_thread();
            if let Some(workers) = config.workers.filter(|&w| w > 0) {
                builder.worker_threads(workers);
            }
            info!(workers = ?config.workers, "Using multi-thread runtime");
            builder.enable_all().build()
        }
    }
}
