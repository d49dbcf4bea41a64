//! # Authentication Middleware
//!
//! Bearer tokens encode the caller's role and user id:
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}
//! ```
//!
//! with `role` one of `student | instructor | admin`. The secret segment is
//! compared in constant time against `AUTH_TOKEN`. When `AUTH_TOKEN` is unset
//! (development mode) the secret is not checked and `{role}:{user_id}` is
//! accepted on its own.
//!
//! The middleware resolves the header into a [`Principal`] exactly once and
//! stores it in request extensions; handlers take it through the [`Caller`]
//! extractor.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coursepay_core::{Principal, Role, UserId};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Caller ──────────────────────────────────────────────────────────────────

/// The authenticated principal for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Principal);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(Caller)
            .ok_or_else(|| AppError::Unauthorized("no principal in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<Zeroizing<String>>,
}

impl AuthConfig {
    /// Require `token` as the shared bearer secret.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(Zeroizing::new(token.into())),
        }
    }

    /// Development mode: no secret is checked.
    pub fn disabled() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token into a [`Principal`].
///
/// With `expected_secret = None` the secret segment is optional and ignored.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<Principal, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    let (role_str, user_str) = match (parts.as_slice(), expected_secret) {
        ([role, user, secret], Some(expected)) => {
            if !constant_time_token_eq(secret, expected) {
                return Err("invalid bearer token".into());
            }
            (*role, *user)
        }
        ([role, user, _], None) | ([role, user], None) => (*role, *user),
        _ => return Err("invalid token format, expected {role}:{user_id}:{secret}".into()),
    };

    let role: Role = role_str.parse().map_err(|_| format!("unknown role: {role_str}"))?;
    let id: UserId = user_str
        .parse()
        .map_err(|_| format!("invalid user_id: {user_str}"))?;
    Ok(Principal::new(id, role))
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the `Authorization` header into a [`Principal`] and inject it
/// into request extensions.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let principal = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => {
                parse_bearer_token(provided, config.token.as_ref().map(|t| t.as_str()))
            }
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match principal {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
