//! Seam between the driver's OIDC callback and an external OIDC library.
//!
//! The driver invokes a human-flow callback whenever it needs a token;
//! the callback delegates to an injected [`OidcFlowHandler`], which runs
//! the actual auth-code or device-code flow. When the handler needs the
//! human (device flow), it reports the verification URL and user code
//! through the prompt channel, which the connection manager surfaces in
//! the `connecting` state.

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::state::AuthType;

/// Everything a flow implementation needs to talk to the IdP.
#[derive(Debug, Clone)]
pub struct OidcTokenRequest {
    pub flow: AuthType,
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub request_scopes: Option<Vec<String>>,
    pub refresh_token: Option<String>,
    /// Browser command for the auth flow, when one is configured.
    pub browser: Option<String>,
}

/// Token material returned by a flow implementation.
#[derive(Debug, Clone)]
pub struct OidcToken {
    pub access_token: String,
    pub expires: Option<Instant>,
    pub refresh_token: Option<String>,
}

/// Device-code prompt data reported mid-flow.
#[derive(Debug, Clone)]
pub struct DeviceCodePrompt {
    pub verification_url: String,
    pub user_code: String,
}

pub type PromptSender = mpsc::UnboundedSender<DeviceCodePrompt>;

/// External OIDC library adapter. Implementations perform the flow named
/// in the request and return token material; device-flow implementations
/// must report the prompt through `prompts` before blocking on the IdP.
#[async_trait]
pub trait OidcFlowHandler: Send + Sync {
    async fn acquire_token(
        &self,
        request: OidcTokenRequest,
        prompts: PromptSender,
    ) -> anyhow::Result<OidcToken>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Handler that immediately reports a prompt and returns a fixed token.
    pub struct StaticFlowHandler {
        pub token: String,
        pub prompt: Option<DeviceCodePrompt>,
    }

    #[async_trait]
    impl OidcFlowHandler for StaticFlowHandler {
        async fn acquire_token(
            &self,
            _request: OidcTokenRequest,
            prompts: PromptSender,
        ) -> anyhow::Result<OidcToken> {
            if let Some(prompt) = &self.prompt {
                let _ = prompts.send(prompt.clone());
            }
            Ok(OidcToken {
                access_token: self.token.clone(),
                expires: None,
                refresh_token: None,
            })
        }
    }
}
