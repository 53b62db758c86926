use serde::{Deserialize, Serialize};

use super::ActorId;

/// How the authenticated actor is established for a request
///
/// Identity is issued elsewhere; both modes only read a claim that an
/// upstream identity provider already vouched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Trust an identity header injected by an authenticating proxy
    #[default]
    Header,
    /// Validate a JWT bearer token and use its `sub` claim
    BearerToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub jwt_algorithm: Option<String>,
}

fn default_identity_header() -> String {
    "x-user-id".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Header,
            identity_header: default_identity_header(),
            jwt_secret: None,
            jwt_algorithm: Some("HS256".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthContext {
    pub authenticated: bool,
    pub user_id: Option<ActorId>,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn actor(user_id: impl Into<ActorId>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            roles: vec!["user".to_string()],
        }
    }
}
