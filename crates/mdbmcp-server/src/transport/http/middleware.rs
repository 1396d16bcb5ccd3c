//! Session routing and header enforcement for `/mcp`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, warn};

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::error::jsonrpc;

use super::super::session_store::SessionStore;
use crate::handler::McpServerHandler;
use crate::logging::McpLogSinkHandle;

/// Wire header carrying the session id.
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Upper bound when buffering request bodies for inspection.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// State shared by the middleware stack.
#[derive(Clone)]
pub struct HttpState {
    config: Arc<UserConfig>,
    store: SessionStore,
    /// Handlers created by the service factory during an initialize
    /// request, waiting to be paired with the session id the protocol
    /// layer allocates for them.
    unclaimed: Arc<Mutex<VecDeque<(McpServerHandler, McpLogSinkHandle)>>>,
}

impl HttpState {
    pub fn new(config: Arc<UserConfig>, store: SessionStore) -> Self {
        Self {
            config,
            store,
            unclaimed: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Called by the service factory when it builds a handler for a new
    /// wire session.
    pub fn stash_new_handler(&self, handler: McpServerHandler, sink_handle: McpLogSinkHandle) {
        self.unclaimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((handler, sink_handle));
    }

    fn claim_new_handler(&self) -> Option<(McpServerHandler, McpLogSinkHandle)> {
        self.unclaimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

/// Enforce configured `httpHeaders` on every request; mismatches are a
/// plain HTTP 403, not a JSON-RPC error.
pub async fn header_enforcement_middleware(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.http_headers.is_empty() {
        for (name, expected) in &state.config.http_headers {
            let matches = request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == expected);
            if !matches {
                warn!(header = %name, "[Http] Required header missing or mismatched");
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }
    next.run(request).await
}

/// Validate the `Mcp-Session-Id` routing contract and keep the session
/// store's timers fresh.
pub async fn session_middleware(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    match session_id_from(request.headers()) {
        SessionHeader::Missing => handle_without_session(state, request, next).await,
        SessionHeader::Invalid => jsonrpc_error(
            jsonrpc::SESSION_ID_INVALID,
            "Invalid Mcp-Session-Id header",
            StatusCode::BAD_REQUEST,
        ),
        SessionHeader::Present(session_id) => {
            if !state.store.touch(&session_id).await {
                return jsonrpc_error(
                    jsonrpc::SESSION_NOT_FOUND,
                    "No active session for the provided Mcp-Session-Id",
                    StatusCode::NOT_FOUND,
                );
            }
            let method = request.method().clone();
            let response = guarded(next.run(request)).await;
            if method == Method::DELETE && response.status().is_success() {
                state.store.forget(&session_id).await;
            }
            response
        }
    }
}

/// No session header: only a POSTed `initialize` request may proceed,
/// and a successful one registers the freshly created session.
async fn handle_without_session(state: HttpState, request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        return jsonrpc_error(
            jsonrpc::SESSION_ID_REQUIRED,
            "Mcp-Session-Id header is required",
            StatusCode::BAD_REQUEST,
        );
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return jsonrpc_error(
                jsonrpc::INVALID_REQUEST,
                "Request body could not be read",
                StatusCode::BAD_REQUEST,
            )
        }
    };
    if !is_initialize_request(&bytes) {
        return jsonrpc_error(
            jsonrpc::INVALID_REQUEST,
            "A request without a session id must be an initialize request",
            StatusCode::BAD_REQUEST,
        );
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = guarded(next.run(request)).await;

    // Pair the handler the factory produced with the session id the
    // protocol layer allocated for it.
    if response.status().is_success() {
        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            if let Some((handler, sink_handle)) = state.claim_new_handler() {
                state
                    .store
                    .register(session_id.to_string(), handler, sink_handle)
                    .await;
            } else {
                debug!(session_id, "[Http] Initialize response without a pending handler");
            }
        }
    }
    response
}

/// Map uncaught handler failures to the generic processing error.
async fn guarded(run: impl std::future::Future<Output = Response>) -> Response {
    let response = run.await;
    if response.status().is_server_error() {
        return jsonrpc_error(
            jsonrpc::PROCESSING_REQUEST_FAILED,
            "Failed to process the request",
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }
    response
}

enum SessionHeader {
    Missing,
    Invalid,
    Present(String),
}

fn session_id_from(headers: &HeaderMap) -> SessionHeader {
    let Some(raw) = headers.get(SESSION_ID_HEADER) else {
        return SessionHeader::Missing;
    };
    match raw.to_str() {
        Ok(value) if is_well_formed_session_id(value) => {
            SessionHeader::Present(value.to_string())
        }
        _ => SessionHeader::Invalid,
    }
}

fn is_well_formed_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// True when the body is an `initialize` request (or a batch containing
/// one).
fn is_initialize_request(bytes: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return false;
    };
    match &value {
        Value::Object(_) => is_initialize_message(&value),
        Value::Array(items) => items.iter().any(is_initialize_message),
        _ => false,
    }
}

fn is_initialize_message(value: &Value) -> bool {
    value.get("method").and_then(Value::as_str) == Some("initialize")
}

fn jsonrpc_error(code: i32, message: &str, status: StatusCode) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": Value::Null,
        "error": { "code": code, "message": message },
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_detection_handles_single_and_batch() {
        let single = br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        assert!(is_initialize_request(single));

        let batch = br#"[{"jsonrpc":"2.0","method":"notifications/initialized"},
                          {"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}]"#;
        assert!(is_initialize_request(batch));

        let other = br#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;
        assert!(!is_initialize_request(other));
        assert!(!is_initialize_request(b"not json"));
    }

    #[test]
    fn session_id_shape_validation() {
        assert!(is_well_formed_session_id(
            "3f6e2f3a-0000-4d4e-9f00-9f3f3f3f3f3f"
        ));
        assert!(is_well_formed_session_id("abc123"));
        assert!(!is_well_formed_session_id(""));
        assert!(!is_well_formed_session_id("has spaces"));
        assert!(!is_well_formed_session_id(&"x".repeat(200)));
    }

    #[test]
    fn jsonrpc_error_bodies_carry_the_code() {
        let response = jsonrpc_error(
            jsonrpc::SESSION_NOT_FOUND,
            "nope",
            StatusCode::NOT_FOUND,
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
