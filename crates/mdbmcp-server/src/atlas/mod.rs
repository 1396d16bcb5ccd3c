//! Thin typed client for the Atlas Administration API.
//!
//! Authentication uses OAuth2 client credentials (service accounts); the
//! bearer token is cached until shortly before expiry and refreshed on
//! demand. Every method maps to one documented endpoint and decodes into
//! the types in [`types`].

mod cluster_connect;
pub mod types;

pub use cluster_connect::{query_connection, ClusterConnectFlow, ClusterConnectionState};

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use mdbmcp_core::ErrorCode;

use types::*;

/// Versioned media type required by the Atlas Administration API.
const ATLAS_MEDIA_TYPE: &str = "application/vnd.atlas.2025-03-12+json";

/// Refresh the token this long before it actually expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Atlas Administration API client with OAuth2 client-credential refresh.
pub struct AtlasApiClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl AtlasApiClient {
    pub fn new(base_url: impl Into<String>, client_id: String, client_secret: String) -> Arc<Self> {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Arc::new(Self {
            base_url,
            client_id,
            client_secret,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ErrorCode> {
        let mut cache = self.token.lock().await;
        if let Some(token) = cache.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("[Atlas] Requesting new service-account token");
        let response = self
            .http
            .post(format!("{}api/oauth/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ErrorCode::Operation(format!(
                "Atlas token request failed with status {}",
                response.status()
            )));
        }

        let token: OauthTokenResponse = response
            .json()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas token response invalid: {e}")))?;
        let expires_in = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let access_token = token.access_token.clone();
        *cache = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + expires_in.saturating_sub(TOKEN_EXPIRY_SLACK),
        });
        Ok(access_token)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ErrorCode> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas API request failed: {e}")))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ErrorCode> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, ATLAS_MEDIA_TYPE)
            .json(body)
            .send()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas API request failed: {e}")))?;
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ErrorCode> {
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas API request failed: {e}")))?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ErrorCode> {
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas API response invalid: {e}")))
    }

    async fn status_error(response: reqwest::Response) -> ErrorCode {
        let status = response.status();
        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_default();
        ErrorCode::Operation(format!("Atlas API error {status}: {detail}"))
    }

    // ── Typed endpoints ────────────────────────────────────────────────

    pub async fn list_orgs(&self) -> Result<Vec<AtlasOrg>, ErrorCode> {
        Ok(self
            .get_json::<ApiEnvelope<AtlasOrg>>("api/atlas/v2/orgs")
            .await?
            .results)
    }

    pub async fn list_projects(&self) -> Result<Vec<AtlasProject>, ErrorCode> {
        Ok(self
            .get_json::<ApiEnvelope<AtlasProject>>("api/atlas/v2/groups")
            .await?
            .results)
    }

    pub async fn create_project(
        &self,
        name: &str,
        org_id: &str,
    ) -> Result<AtlasProject, ErrorCode> {
        self.post_json(
            "api/atlas/v2/groups",
            &serde_json::json!({ "name": name, "orgId": org_id }),
        )
        .await
    }

    pub async fn list_clusters(&self, project_id: &str) -> Result<Vec<AtlasCluster>, ErrorCode> {
        Ok(self
            .get_json::<ApiEnvelope<AtlasCluster>>(&format!(
                "api/atlas/v2/groups/{project_id}/clusters"
            ))
            .await?
            .results)
    }

    pub async fn get_cluster(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<AtlasCluster, ErrorCode> {
        self.get_json(&format!(
            "api/atlas/v2/groups/{project_id}/clusters/{cluster_name}"
        ))
        .await
    }

    pub async fn create_free_cluster(
        &self,
        project_id: &str,
        name: &str,
        region: &str,
    ) -> Result<AtlasCluster, ErrorCode> {
        let body = serde_json::json!({
            "name": name,
            "clusterType": "REPLICASET",
            "replicationSpecs": [{
                "regionConfigs": [{
                    "providerName": "TENANT",
                    "backingProviderName": "AWS",
                    "regionName": region,
                    "electableSpecs": { "instanceSize": "M0" },
                    "priority": 7
                }]
            }]
        });
        self.post_json(&format!("api/atlas/v2/groups/{project_id}/clusters"), &body)
            .await
    }

    pub async fn list_access_list(
        &self,
        project_id: &str,
    ) -> Result<Vec<AccessListEntry>, ErrorCode> {
        Ok(self
            .get_json::<ApiEnvelope<AccessListEntry>>(&format!(
                "api/atlas/v2/groups/{project_id}/accessList"
            ))
            .await?
            .results)
    }

    /// Add entries to the project IP access list. Idempotent: an entry
    /// that already exists (409) counts as success.
    pub async fn create_access_list_entries(
        &self,
        project_id: &str,
        entries: &[AccessListEntry],
    ) -> Result<(), ErrorCode> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}api/atlas/v2/groups/{project_id}/accessList",
                self.base_url
            ))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, ATLAS_MEDIA_TYPE)
            .json(entries)
            .send()
            .await
            .map_err(|e| ErrorCode::Operation(format!("Atlas API request failed: {e}")))?;
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    pub async fn list_db_users(&self, project_id: &str) -> Result<Vec<DatabaseUser>, ErrorCode> {
        Ok(self
            .get_json::<ApiEnvelope<DatabaseUser>>(&format!(
                "api/atlas/v2/groups/{project_id}/databaseUsers"
            ))
            .await?
            .results)
    }

    pub async fn create_db_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<DatabaseUser, ErrorCode> {
        self.post_json(
            &format!("api/atlas/v2/groups/{project_id}/databaseUsers"),
            user,
        )
        .await
    }

    pub async fn delete_db_user(&self, project_id: &str, username: &str) -> Result<(), ErrorCode> {
        self.delete(&format!(
            "api/atlas/v2/groups/{project_id}/databaseUsers/admin/{username}"
        ))
        .await
    }

    /// The caller's public IP, as seen by Atlas.
    pub async fn current_ip(&self) -> Result<String, ErrorCode> {
        let ip: CurrentIp = self
            .get_json("api/private/unauth/account/current-ip")
            .await?;
        Ok(ip.current_ipv4_address)
    }
}

impl std::fmt::Debug for AtlasApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
