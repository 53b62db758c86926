use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::auth::{AuthConfig, AuthContext, AuthMode};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    #[serde(default)]
    roles: Vec<String>,
}

/// Establishes the acting user of each API request
pub struct AuthMiddleware {
    config: Arc<AuthConfig>,
}

pub type SharedAuthMiddleware = Arc<AuthMiddleware>;

impl AuthMiddleware {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        match self.config.mode {
            AuthMode::Header => self.read_identity_header(headers),
            AuthMode::BearerToken => self.validate_bearer_token(headers),
        }
    }

    fn read_identity_header(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let user_id = headers
            .get(self.config.identity_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        Ok(AuthContext::actor(user_id))
    }

    fn validate_bearer_token(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let auth_header = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidCredentials)?;

        let secret = self
            .config
            .jwt_secret
            .as_ref()
            .ok_or(AuthError::ConfigurationError)?;

        let algorithm = match self.config.jwt_algorithm.as_deref() {
            Some("HS384") => Algorithm::HS384,
            Some("HS512") => Algorithm::HS512,
            _ => Algorithm::HS256,
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AuthError::InvalidCredentials
        })?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(AuthContext {
            authenticated: true,
            user_id: Some(token_data.claims.sub),
            roles: token_data.claims.roles,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingCredentials,
    InvalidCredentials,
    ConfigurationError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingCredentials => {
                (StatusCode::UNAUTHORIZED, "missing_credentials", "Missing credentials")
            }
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", "Invalid credentials")
            }
            AuthError::ConfigurationError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "auth_configuration",
                "Auth configuration error",
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message,
                "code": code,
            })),
        )
            .into_response()
    }
}

pub async fn auth_middleware(
    State(auth): State<SharedAuthMiddleware>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = auth.authenticate(request.headers())?;

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn bearer_config() -> Arc<AuthConfig> {
        Arc::new(AuthConfig {
            mode: AuthMode::BearerToken,
            jwt_secret: Some("test-secret".to_string()),
            ..Default::default()
        })
    }

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            roles: vec!["user".to_string()],
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_header_mode_reads_identity() {
        let middleware = AuthMiddleware::new(Arc::new(AuthConfig::default()));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("seller-1"));

        let context = middleware.authenticate(&headers).unwrap();
        assert!(context.authenticated);
        assert_eq!(context.user_id.as_deref(), Some("seller-1"));
    }

    #[test]
    fn test_header_mode_custom_header() {
        let middleware = AuthMiddleware::new(Arc::new(AuthConfig {
            identity_header: "x-forwarded-user".to_string(),
            ..Default::default()
        }));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("ignored"));
        assert_eq!(
            middleware.authenticate(&headers).unwrap_err(),
            AuthError::MissingCredentials
        );

        headers.insert("x-forwarded-user", HeaderValue::from_static("buyer-7"));
        let context = middleware.authenticate(&headers).unwrap();
        assert_eq!(context.user_id.as_deref(), Some("buyer-7"));
    }

    #[test]
    fn test_header_mode_blank_identity() {
        let middleware = AuthMiddleware::new(Arc::new(AuthConfig::default()));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("   "));
        assert_eq!(
            middleware.authenticate(&headers).unwrap_err(),
            AuthError::MissingCredentials
        );
    }

    #[test]
    fn test_bearer_token_success() {
        let middleware = AuthMiddleware::new(bearer_config());
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("buyer-1", "test-secret"));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        let context = middleware.authenticate(&headers).unwrap();
        assert_eq!(context.user_id.as_deref(), Some("buyer-1"));
    }

    #[test]
    fn test_bearer_token_wrong_secret() {
        let middleware = AuthMiddleware::new(bearer_config());
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("buyer-1", "other-secret"));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        assert_eq!(
            middleware.authenticate(&headers).unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn test_bearer_token_missing() {
        let middleware = AuthMiddleware::new(bearer_config());
        assert_eq!(
            middleware.authenticate(&HeaderMap::new()).unwrap_err(),
            AuthError::MissingCredentials
        );
    }

    #[test]
    fn test_bearer_without_secret() {
        let middleware = AuthMiddleware::new(Arc::new(AuthConfig {
            mode: AuthMode::BearerToken,
            ..Default::default()
        }));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(
            middleware.authenticate(&headers).unwrap_err(),
            AuthError::ConfigurationError
        );
    }
}
