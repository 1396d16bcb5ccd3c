//! Error taxonomy shared across the server.
//!
//! Tool bodies and the dispatcher signal failures through [`ErrorCode`];
//! the dispatcher maps each variant to the protocol reply described in the
//! error-handling design (connect hints, OIDC prompts, plain tool errors).

use thiserror::Error;

/// JSON-RPC error codes used by the streamable HTTP transport for
/// session-routing failures.
pub mod jsonrpc {
    /// Uncaught handler error while processing a request.
    pub const PROCESSING_REQUEST_FAILED: i32 = -32000;
    /// Request requires an `Mcp-Session-Id` header but none was sent.
    pub const SESSION_ID_REQUIRED: i32 = -32001;
    /// The `Mcp-Session-Id` header is not a well-formed session id.
    pub const SESSION_ID_INVALID: i32 = -32002;
    /// No live session matches the provided id.
    pub const SESSION_NOT_FOUND: i32 = -32003;
    /// Body is neither an `initialize` request nor scoped to a session.
    pub const INVALID_REQUEST: i32 = -32004;
}

/// Failures that cross the tool/dispatch boundary.
#[derive(Debug, Error)]
pub enum ErrorCode {
    /// No live driver handle. Recoverable by running a connect tool.
    #[error("Not connected to MongoDB{}", detail_suffix(.0))]
    NotConnectedToMongoDB(Option<String>),

    /// The driver rejected the URI or credentials. Recoverable by the user
    /// editing their configuration.
    #[error("Misconfigured connection string: {0}")]
    MisconfiguredConnectionString(String),

    /// The index-check gate found a full collection scan.
    #[error("{0}")]
    ForbiddenCollscan(String),

    /// Read-only mode denies a mutation.
    #[error("Server is in read-only mode, write operation `{0}` is not allowed")]
    ForbiddenWriteOperation(String),

    /// An OIDC flow is still waiting on the human. Carries the prompt data
    /// the agent must relay to the user.
    #[error("Authentication in progress")]
    OidcInProgress {
        login_url: Option<String>,
        user_code: Option<String>,
    },

    /// Tool input failed schema validation.
    #[error("Invalid arguments: {0}")]
    InvalidToolArguments(String),

    /// Anything the driver or the Atlas API surfaced that has no dedicated
    /// mapping; shown verbatim as tool error text.
    #[error("{0}")]
    Operation(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

impl ErrorCode {
    /// True for errors the dispatcher turns into the "you need to connect"
    /// two-part reply instead of a generic tool error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::NotConnectedToMongoDB(_) | ErrorCode::MisconfiguredConnectionString(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_message_includes_detail() {
        let plain = ErrorCode::NotConnectedToMongoDB(None);
        assert_eq!(plain.to_string(), "Not connected to MongoDB");

        let atlas = ErrorCode::NotConnectedToMongoDB(Some(
            "still connecting to your Atlas cluster".to_string(),
        ));
        assert_eq!(
            atlas.to_string(),
            "Not connected to MongoDB: still connecting to your Atlas cluster"
        );
    }

    #[test]
    fn connection_errors_are_classified() {
        assert!(ErrorCode::NotConnectedToMongoDB(None).is_connection_error());
        assert!(
            ErrorCode::MisconfiguredConnectionString("bad".into()).is_connection_error()
        );
        assert!(!ErrorCode::ForbiddenWriteOperation("drop-database".into()).is_connection_error());
    }
}
