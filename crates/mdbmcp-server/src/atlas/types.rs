//! Typed payloads for the Atlas Administration API.

use serde::{Deserialize, Serialize};

/// Standard Atlas list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasOrg {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasProject {
    pub id: String,
    pub name: String,
    pub org_id: String,
    #[serde(default)]
    pub cluster_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasConnectionStrings {
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub standard_srv: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasCluster {
    pub name: String,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub mongo_db_version: Option<String>,
    #[serde(default)]
    pub connection_strings: Option<AtlasConnectionStrings>,
    #[serde(default)]
    pub paused: Option<bool>,
}

impl AtlasCluster {
    /// Preferred connection string: SRV, falling back to the seed list.
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_strings.as_ref().and_then(|cs| {
            cs.standard_srv
                .as_deref()
                .or(cs.standard.as_deref())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserRole {
    pub role_name: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserScope {
    pub name: String,
    #[serde(rename = "type")]
    pub scope_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUser {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database_name: String,
    pub roles: Vec<DatabaseUserRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<DatabaseUserScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIp {
    pub current_ipv4_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_prefers_srv_connection_string() {
        let cluster: AtlasCluster = serde_json::from_value(serde_json::json!({
            "name": "Cluster0",
            "stateName": "IDLE",
            "connectionStrings": {
                "standard": "mongodb://a,b,c/?ssl=true",
                "standardSrv": "mongodb+srv://cluster0.mongodb.net"
            }
        }))
        .unwrap();
        assert_eq!(
            cluster.connection_string(),
            Some("mongodb+srv://cluster0.mongodb.net")
        );
    }

    #[test]
    fn envelope_tolerates_missing_results() {
        let envelope: ApiEnvelope<AtlasOrg> = serde_json::from_str("{}").unwrap();
        assert!(envelope.results.is_empty());
    }

    #[test]
    fn database_user_serializes_scope_type_field() {
        let user = DatabaseUser {
            username: "u".into(),
            password: Some("p".into()),
            database_name: "admin".into(),
            roles: vec![DatabaseUserRole {
                role_name: "readAnyDatabase".into(),
                database_name: "admin".into(),
            }],
            scopes: vec![DatabaseUserScope {
                name: "Cluster0".into(),
                scope_type: "CLUSTER".into(),
            }],
            delete_after_date: None,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["scopes"][0]["type"], "CLUSTER");
        assert_eq!(value["roles"][0]["roleName"], "readAnyDatabase");
    }
}
