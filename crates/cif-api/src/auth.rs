//! # Admin Authentication Middleware
//!
//! Bearer token middleware for the admin area.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {admin_id}:{secret}   — named administrator
//! Bearer {secret}              — legacy format (admin id "admin")
//! ```
//!
//! Every authenticated request gets an [`AdminIdentity`] injected into the
//! request extensions. CSRF tokens are bound to that identity.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Admin id assigned to legacy tokens and to requests when auth is disabled.
pub const DEFAULT_ADMIN_ID: &str = "admin";

// ── AdminIdentity ───────────────────────────────────────────────────────────

/// The authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub admin_id: String,
}

impl AdminIdentity {
    pub fn new(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
        }
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if none is present.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AdminIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no admin identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
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
///
/// When lengths differ, performs a dummy comparison so timing does not
/// depend on where the inputs diverge.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn valid_admin_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'@'))
}

/// Parse a bearer token in format `{admin_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<AdminIdentity, String> {
    if constant_time_token_eq(provided, expected_secret) {
        return Ok(AdminIdentity::new(DEFAULT_ADMIN_ID));
    }
    let Some((admin_id, secret)) = provided.split_once(':') else {
        return Err("invalid bearer token".into());
    };
    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }
    if !valid_admin_id(admin_id) {
        return Err("invalid admin id in bearer token".into());
    }
    Ok(AdminIdentity::new(admin_id))
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject [`AdminIdentity`].
///
/// When `AuthConfig.token` is `None`, every request is accepted as the
/// default administrator (development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request
                .extensions_mut()
                .insert(AdminIdentity::new(DEFAULT_ADMIN_ID));
            next.run(request).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<String>) -> Router {
        let auth_config = AuthConfig { token };
        Router::new()
            .route(
                "/whoami",
                get(|who: AdminIdentity| async move { who.admin_id }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(a) = auth {
            builder = builder.header("Authorization", a);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    // ── Middleware ───────────────────────────────────────────────

    #[tokio::test]
    async fn legacy_token_is_default_admin() {
        let (status, body) = call(test_app(Some("s3cret".into())), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn named_token_carries_admin_id() {
        let (status, body) =
            call(test_app(Some("s3cret".into())), Some("Bearer alice:s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Bearer alice:nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) =
            call(test_app(Some("s3cret".into())), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_allows_all_requests() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    // ── Token parsing ────────────────────────────────────────────

    #[test]
    fn secret_may_contain_colons() {
        let id = parse_bearer_token("bob:a:b", "a:b").unwrap();
        assert_eq!(id.admin_id, "bob");
    }

    #[test]
    fn legacy_secret_may_contain_colons() {
        let id = parse_bearer_token("a:b", "a:b").unwrap();
        assert_eq!(id.admin_id, DEFAULT_ADMIN_ID);
    }

    #[test]
    fn bad_admin_id_rejected() {
        assert!(parse_bearer_token(":s3cret", "s3cret").is_err());
        assert!(parse_bearer_token("bad id:s3cret", "s3cret").is_err());
    }

    #[test]
    fn constant_time_eq() {
        assert!(constant_time_token_eq("secret-token-123", "secret-token-123"));
        assert!(!constant_time_token_eq("wrong-token", "secret-token-123"));
        assert!(!constant_time_token_eq("secret", "secret-token-123"));
        assert!(!constant_time_token_eq("", "secret-token-123"));
    }

    #[test]
    fn auth_config_debug_redacts() {
        let cfg = AuthConfig {
            token: Some("s3cret".into()),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("REDACTED"));
    }
}
