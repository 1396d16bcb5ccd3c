//! MongoDB MCP server entry point.
//!
//! Resolution order: built-in defaults, then `MDB_MCP_*` environment
//! variables, then CLI flags. Validation failures and transport bind
//! failures are the only fatal errors; everything at runtime surfaces
//! as tool results.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mdbmcp_core::config::{env as config_env, validation, TransportKind, UserConfig};
use mdbmcp_core::logging::cleanup_disk_logs;
use mdbmcp_server::{transport, ServerContext};

/// Disk log retention policy.
const LOG_RETENTION_DAYS: u32 = 30;
const LOG_SIZE_CAP_BYTES: u64 = 1024 * 1024 * 1024;

fn main() {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };
    let code = runtime.block_on(run());
    std::process::exit(code);
}

async fn run() -> i32 {
    // Stderr diagnostics; the component logger's stderr sink routes
    // through this subscriber as well.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let mut config = UserConfig::default();
    config_env::apply_process_env(&mut config);
    if let Err(e) = cli.apply(&mut config) {
        error!("Invalid command line arguments: {e}");
        return 1;
    }
    if let Err(e) = validation::validate(&config) {
        error!("Invalid configuration: {e}");
        return 1;
    }

    let config = Arc::new(config);
    let context = match ServerContext::new(config.clone(), None) {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!("Failed to initialize server: {e:#}");
            return 1;
        }
    };

    spawn_log_retention(config.clone());

    let result = match config.transport {
        TransportKind::Stdio => transport::stdio::run(&context).await,
        TransportKind::Http => transport::http::run(context.clone()).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Server failed: {e:#}");
            1
        }
    }
}

/// Daily sweep of rotated disk logs: 30-day retention, 1 GiB cap.
fn spawn_log_retention(config: Arc<UserConfig>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) =
                cleanup_disk_logs(&config.log_path, LOG_RETENTION_DAYS, LOG_SIZE_CAP_BYTES).await
            {
                tracing::debug!("Log cleanup failed: {e}");
            }
            tokio::time::sleep(std::time::Duration::from_secs(24 * 60 * 60)).await;
        }
    });
}
