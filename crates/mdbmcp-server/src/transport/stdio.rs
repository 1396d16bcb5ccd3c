//! stdio transport: newline-delimited JSON-RPC on stdin/stdout.
//!
//! One session and one connection live for the whole process. Extended
//! JSON round-trips at the BSON boundary (see `ejson`), so ObjectId and
//! Date arguments survive the trip through plain JSON-RPC framing.

use anyhow::{Context, Result};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tracing::info;

use mdbmcp_core::{LogId, TelemetryEvent};

use crate::server::ServerContext;

/// Serve one session over stdin/stdout until EOF or a signal.
///
/// Returns the process exit code: 0 on clean close, 1 when session
/// close fails.
pub async fn run(context: &ServerContext) -> Result<i32> {
    let (handler, _mcp_sink) = context.new_handler();
    let session = handler.session().clone();

    session.logger().info(
        LogId::SERVER_STARTED,
        "server",
        "MongoDB MCP server started on stdio",
    );
    context
        .telemetry()
        .emit(TelemetryEvent::server_event("start", 0));

    let service = handler
        .serve(stdio())
        .await
        .context("Failed to start stdio transport")?;

    let cancel_token = service.cancellation_token();
    let mut wait_handle = tokio::spawn(service.waiting());

    tokio::select! {
        quit = &mut wait_handle => {
            info!("[Stdio] Client closed the stream: {quit:?}");
        }
        () = super::shutdown_signal() => {
            cancel_token.cancel();
            let _ = (&mut wait_handle).await;
        }
    }

    // Stop accepting work, then tear the session down. A hung close
    // (e.g. a wedged driver shutdown) turns into exit code 1.
    let exit_code = match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(()) => {
            session.logger().info(
                LogId::SERVER_CLOSED,
                "server",
                "MongoDB MCP server stopped",
            );
            0
        }
        Err(_) => {
            session.logger().error(
                LogId::SERVER_CLOSE_FAILURE,
                "server",
                "Session close timed out during shutdown",
            );
            1
        }
    };
    context
        .telemetry()
        .emit(TelemetryEvent::server_event("stop", 0));
    context.close().await;
    Ok(exit_code)
}

const CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
