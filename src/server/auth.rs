//! Static token authentication.
//!
//! Tokens are loaded once at startup from a YAML file mapping each token to
//! a user id and role. Requests carry the token either as a Bearer header or
//! a `session_token` cookie.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::AppState;
use crate::models::Role;

/// Token entry in the tokens file.
#[derive(Debug, Clone, Deserialize)]
struct TokenEntry {
    token: String,
    user_id: String,
    role: Role,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TokensFile {
    #[serde(default)]
    tokens: Vec<TokenEntry>,
}

/// Authenticated user info, added to request extensions after auth.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthUser {
    /// Role gate for handlers. Admins pass every gate.
    pub fn require(&self, allowed: &[Role]) -> Result<(), super::error::ApiError> {
        if self.role == Role::Admin || allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(super::error::ApiError::Forbidden(format!(
                "Access denied for role {}",
                self.role
            )))
        }
    }
}

/// Token store - maps token -> AuthUser.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, AuthUser>,
}

impl TokenStore {
    /// Load tokens from the YAML file at `path`.
    pub fn load(path: &Path) -> Self {
        let tokens = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<TokensFile>(&contents) {
                Ok(file) => {
                    let mut map = HashMap::new();
                    for entry in file.tokens {
                        map.insert(
                            entry.token,
                            AuthUser {
                                user_id: entry.user_id,
                                role: entry.role,
                            },
                        );
                    }
                    tracing::info!("Loaded {} token(s)", map.len());
                    map
                }
                Err(e) => {
                    tracing::warn!("Failed to parse tokens file: {}", e);
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read tokens file {}: {}", path.display(), e);
                tracing::warn!("No tokens loaded - all authenticated requests will fail");
                HashMap::new()
            }
        };

        Self { tokens }
    }

    #[cfg(test)]
    pub fn with_token(token: &str, user_id: &str, role: Role) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            token.to_string(),
            AuthUser {
                user_id: user_id.to_string(),
                role,
            },
        );
        Self { tokens }
    }

    /// Validate a token and return the associated user.
    pub fn validate(&self, token: &str) -> Option<AuthUser> {
        self.tokens.get(token).cloned()
    }
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorBody { error, message }),
    )
        .into_response()
}

/// Pulls the token out of the Authorization header or the `session_token`
/// cookie.
fn extract_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    request
        .headers()
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|c| c.strip_prefix("session_token="))
                .map(str::to_string)
        })
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_token(&request) {
        Some(t) => t,
        None => {
            return unauthorized(
                "missing_auth",
                "Authorization header or session_token cookie required",
            );
        }
    };

    match state.tokens.validate(&token) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_token", "Invalid or expired token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_tokens_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tokens:\n  - token: \"abc123\"\n    user_id: \"u1\"\n    role: \"warden\""
        )
        .unwrap();

        let store = TokenStore::load(file.path());
        let user = store.validate("abc123").unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.role, Role::Warden);
        assert!(store.validate("wrong").is_none());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let store = TokenStore::load(Path::new("/nonexistent/tokens.yaml"));
        assert!(store.validate("anything").is_none());
    }

    #[test]
    fn test_role_gate() {
        let admin = AuthUser {
            user_id: "a".into(),
            role: Role::Admin,
        };
        let student = AuthUser {
            user_id: "s".into(),
            role: Role::Student,
        };

        // Admin passes every gate
        assert!(admin.require(&[Role::Warden]).is_ok());
        assert!(student.require(&[Role::Student]).is_ok());
        assert!(student.require(&[Role::Warden]).is_err());
    }
}
