//! Connection state machine types and auth-type inference.

use mongodb::options::{AuthMechanism, ClientOptions};
use mongodb::Client;
use serde::{Deserialize, Serialize};

use mdbmcp_core::config::{TransportKind, UserConfig};
use mdbmcp_core::ConnectionStateTag;

/// Identity of the Atlas cluster a connection was provisioned for.
/// Preserved across state transitions until explicitly cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasClusterInfo {
    pub project_id: String,
    pub cluster_name: String,
    /// Temporary database user created for this connection.
    pub username: String,
    pub expiry_date: chrono::DateTime<chrono::Utc>,
}

/// How the connection authenticates, inferred from the URI and runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    Scram,
    #[serde(rename = "x.509")]
    X509,
    Kerberos,
    Ldap,
    OidcAuthFlow,
    OidcDeviceFlow,
}

impl AuthType {
    pub fn is_oidc(self) -> bool {
        matches!(self, AuthType::OidcAuthFlow | AuthType::OidcDeviceFlow)
    }

    /// Infer the auth type from parsed client options plus the transport
    /// configuration.
    ///
    /// The OIDC auth (browser) flow is only offered when a browser can
    /// actually open on the user's machine: stdio with a configured
    /// browser, or HTTP bound to loopback with a configured browser.
    /// Anything else falls back to the device flow.
    pub fn infer(options: &ClientOptions, config: &UserConfig) -> AuthType {
        let mechanism = options
            .credential
            .as_ref()
            .and_then(|credential| credential.mechanism.as_ref());
        match mechanism {
            Some(AuthMechanism::MongoDbX509) => AuthType::X509,
            Some(AuthMechanism::Gssapi) => AuthType::Kerberos,
            Some(AuthMechanism::Plain) => AuthType::Ldap,
            Some(AuthMechanism::MongoDbOidc) => {
                if browser_flow_available(config) {
                    AuthType::OidcAuthFlow
                } else {
                    AuthType::OidcDeviceFlow
                }
            }
            _ => AuthType::Scram,
        }
    }
}

fn browser_flow_available(config: &UserConfig) -> bool {
    if config.browser.is_none() {
        return false;
    }
    match config.transport {
        TransportKind::Stdio => true,
        TransportKind::Http => is_loopback_host(&config.http_host),
    }
}

fn is_loopback_host(host: &str) -> bool {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return ip.is_loopback();
    }
    host.eq_ignore_ascii_case("localhost")
}

/// Prompt data for an OIDC flow waiting on the human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcPrompt {
    pub flow: AuthType,
    pub login_url: Option<String>,
    pub user_code: Option<String>,
}

/// The connection state machine. Only `Connected` exposes a usable
/// driver handle; only `Connecting` may carry OIDC prompt data.
#[derive(Clone, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting {
        client: Client,
        auth_type: AuthType,
        oidc: Option<OidcPrompt>,
        atlas: Option<AtlasClusterInfo>,
    },
    Connected {
        client: Client,
        auth_type: AuthType,
        atlas: Option<AtlasClusterInfo>,
    },
    Errored {
        reason: String,
        auth_type: Option<AuthType>,
        atlas: Option<AtlasClusterInfo>,
    },
}

impl ConnectionState {
    pub fn tag(&self) -> ConnectionStateTag {
        match self {
            ConnectionState::Disconnected => ConnectionStateTag::Disconnected,
            ConnectionState::Connecting { .. } => ConnectionStateTag::Connecting,
            ConnectionState::Connected { .. } => ConnectionStateTag::Connected,
            ConnectionState::Errored { .. } => ConnectionStateTag::Errored,
        }
    }

    /// The driver handle, only when `Connected`.
    pub fn client(&self) -> Option<&Client> {
        match self {
            ConnectionState::Connected { client, .. } => Some(client),
            _ => None,
        }
    }

    /// Any driver handle, including one mid-handshake; used only by
    /// disconnect to close it.
    pub(crate) fn any_client(&self) -> Option<&Client> {
        match self {
            ConnectionState::Connected { client, .. }
            | ConnectionState::Connecting { client, .. } => Some(client),
            _ => None,
        }
    }

    pub fn oidc_prompt(&self) -> Option<&OidcPrompt> {
        match self {
            ConnectionState::Connecting { oidc, .. } => oidc.as_ref(),
            _ => None,
        }
    }

    pub fn atlas(&self) -> Option<&AtlasClusterInfo> {
        match self {
            ConnectionState::Connecting { atlas, .. }
            | ConnectionState::Connected { atlas, .. }
            | ConnectionState::Errored { atlas, .. } => atlas.as_ref(),
            ConnectionState::Disconnected => None,
        }
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Connecting { auth_type, oidc, .. } => f
                .debug_struct("Connecting")
                .field("auth_type", auth_type)
                .field("oidc", oidc)
                .finish_non_exhaustive(),
            ConnectionState::Connected { auth_type, atlas, .. } => f
                .debug_struct("Connected")
                .field("auth_type", auth_type)
                .field("atlas", atlas)
                .finish_non_exhaustive(),
            ConnectionState::Errored { reason, .. } => {
                f.debug_struct("Errored").field("reason", reason).finish_non_exhaustive()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(transport: TransportKind, host: &str, browser: Option<&str>) -> UserConfig {
        UserConfig {
            transport,
            http_host: host.to_string(),
            browser: browser.map(String::from),
            ..UserConfig::default()
        }
    }

    async fn options_for(uri: &str) -> ClientOptions {
        ClientOptions::parse(uri).await.unwrap()
    }

    #[tokio::test]
    async fn plain_uri_infers_scram() {
        let options = options_for("mongodb://localhost:27017").await;
        let config = UserConfig::default();
        assert_eq!(AuthType::infer(&options, &config), AuthType::Scram);
    }

    #[tokio::test]
    async fn ldap_mechanism_infers_ldap() {
        let options =
            options_for("mongodb://u:p@localhost:27017/?authMechanism=PLAIN&authSource=$external")
                .await;
        assert_eq!(
            AuthType::infer(&options, &UserConfig::default()),
            AuthType::Ldap
        );
    }

    #[tokio::test]
    async fn oidc_without_browser_uses_device_flow() {
        let options = options_for(
            "mongodb://localhost:27017/?authMechanism=MONGODB-OIDC&authSource=$external",
        )
        .await;
        let config = config_with(TransportKind::Stdio, "127.0.0.1", None);
        assert_eq!(AuthType::infer(&options, &config), AuthType::OidcDeviceFlow);
    }

    #[tokio::test]
    async fn oidc_with_browser_on_stdio_uses_auth_flow() {
        let options = options_for(
            "mongodb://localhost:27017/?authMechanism=MONGODB-OIDC&authSource=$external",
        )
        .await;
        let config = config_with(TransportKind::Stdio, "127.0.0.1", Some("firefox"));
        assert_eq!(AuthType::infer(&options, &config), AuthType::OidcAuthFlow);
    }

    #[tokio::test]
    async fn oidc_on_non_loopback_http_falls_back_to_device_flow() {
        let options = options_for(
            "mongodb://localhost:27017/?authMechanism=MONGODB-OIDC&authSource=$external",
        )
        .await;
        let config = config_with(TransportKind::Http, "0.0.0.0", Some("firefox"));
        assert_eq!(AuthType::infer(&options, &config), AuthType::OidcDeviceFlow);

        let loopback = config_with(TransportKind::Http, "127.0.0.1", Some("firefox"));
        assert_eq!(AuthType::infer(&options, &loopback), AuthType::OidcAuthFlow);
    }

    #[test]
    fn disconnected_state_has_no_client_and_no_atlas() {
        let state = ConnectionState::Disconnected;
        assert!(state.client().is_none());
        assert!(state.atlas().is_none());
        assert_eq!(state.tag(), mdbmcp_core::ConnectionStateTag::Disconnected);
    }
}
