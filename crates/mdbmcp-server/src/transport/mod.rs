//! Transports: stdio (one session per process) and streamable HTTP
//! (per-session lifecycle with keep-alive and idle eviction).

pub mod http;
pub mod session_store;
pub mod stdio;

use tracing::info;

/// Resolves when the process receives a termination signal.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(_) => return std::future::pending::<()>().await,
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return std::future::pending::<()>().await,
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(_) => return std::future::pending::<()>().await,
    };

    tokio::select! {
        _ = interrupt.recv() => info!("[Transport] Received SIGINT"),
        _ = terminate.recv() => info!("[Transport] Received SIGTERM"),
        _ = quit.recv() => info!("[Transport] Received SIGQUIT"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("[Transport] Received Ctrl-C");
    }
}
