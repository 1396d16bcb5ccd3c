//! Streamable HTTP transport: `POST/GET/DELETE /mcp`.
//!
//! The rmcp `StreamableHttpService` does protocol framing and SSE; the
//! middleware around it enforces configured headers, validates the
//! `Mcp-Session-Id` routing contract with the JSON-RPC error codes of
//! the session layer, and feeds the [`SessionStore`]'s timers.

mod middleware;

pub use middleware::HttpState;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware::from_fn_with_state;
use axum::Router;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use mdbmcp_core::TelemetryEvent;

use super::session_store::SessionStore;
use crate::server::ServerContext;

/// SSE keep-alive cadence, matching the session keep-alive ping.
const SSE_KEEP_ALIVE: std::time::Duration = std::time::Duration::from_secs(30);

/// Serve MCP sessions over streamable HTTP until a shutdown signal.
pub async fn run(context: Arc<ServerContext>) -> Result<i32> {
    let config = context.config().clone();
    let session_manager = Arc::new(LocalSessionManager::default());
    let store = SessionStore::new(config.clone(), session_manager.clone());

    let state = HttpState::new(config.clone(), store.clone());

    let factory_context = context.clone();
    let factory_state = state.clone();
    let mcp_service = StreamableHttpService::new(
        move || {
            let (handler, sink_handle) = factory_context.new_handler();
            factory_state.stash_new_handler(handler.clone(), sink_handle);
            Ok(handler)
        },
        session_manager,
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(SSE_KEEP_ALIVE),
            sse_retry: Some(std::time::Duration::from_secs(3)),
            cancellation_token: CancellationToken::new(),
        },
    );

    // Middleware runs outside-in: header enforcement, then session
    // routing, then the protocol service.
    let router = Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::header_enforcement_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("[Http] MongoDB MCP server listening on {addr}");
    context
        .telemetry()
        .emit(TelemetryEvent::server_event("start", 0));

    axum::serve(listener, router)
        .with_graceful_shutdown(super::shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Drain: close every live session, then the shared context.
    store.close_all().await;
    context
        .telemetry()
        .emit(TelemetryEvent::server_event("stop", 0));
    context.close().await;
    info!("[Http] MongoDB MCP server stopped");
    Ok(0)
}
