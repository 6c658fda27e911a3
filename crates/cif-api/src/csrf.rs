//! # CSRF Protection
//!
//! Stateless CSRF tokens for every state-changing admin call.
//!
//! ## Token Format
//!
//! ```text
//! {issued_at}.{nonce_hex}.{signature_hex}
//! ```
//!
//! `issued_at` is a Unix timestamp in seconds, `nonce` is 16 random bytes
//! and the signature is Ed25519 over `csrf:{admin_id}:{issued_at}:{nonce_hex}`.
//! Verification needs only the public key: no token store is kept, so a
//! token works on any replica that shares the signing key.
//!
//! Tokens are rendered into the upload page as the hidden `csrf_token`
//! input and sent back in the `X-CSRF-TOKEN` header.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::auth::AdminIdentity;
use crate::error::AppError;

/// Request header carrying the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Name of the hidden form field the token is rendered into.
pub const CSRF_FIELD: &str = "csrf_token";

/// Tolerated clock skew for tokens issued "in the future".
const MAX_SKEW_SECS: i64 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsrfError {
    #[error("missing X-CSRF-TOKEN header")]
    Missing,
    #[error("malformed CSRF token")]
    Malformed,
    #[error("CSRF token signature is invalid")]
    BadSignature,
    #[error("CSRF token has expired")]
    Expired,
}

/// Error loading the CSRF signing key.
#[derive(Error, Debug)]
pub enum CsrfKeyError {
    #[error("CSRF_SIGNING_KEY_HEX invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("CSRF_SIGNING_KEY_HEX must be exactly 64 hex chars (32 bytes), got {0} bytes")]
    InvalidLength(usize),
}

/// Issues and verifies CSRF tokens.
///
/// Cheap to clone; the key is shared behind an `Arc`.
#[derive(Clone)]
pub struct CsrfSigner {
    signing_key: Arc<SigningKey>,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl std::fmt::Debug for CsrfSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfSigner")
            .field("signing_key", &"[REDACTED]")
            .field("verifying_key", &hex::encode(self.verifying_key.as_bytes()))
            .field("ttl_minutes", &self.ttl.num_minutes())
            .finish()
    }
}

impl CsrfSigner {
    pub fn new(signing_key: SigningKey, ttl: Duration) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key: Arc::new(signing_key),
            verifying_key,
            ttl,
        }
    }

    /// Build a signer from a hex-encoded 32-byte seed.
    pub fn from_hex_seed(seed_hex: &str, ttl: Duration) -> Result<Self, CsrfKeyError> {
        let bytes = Zeroizing::new(hex::decode(seed_hex.trim())?);
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CsrfKeyError::InvalidLength(bytes.len()))?;
        let seed = Zeroizing::new(seed);
        Ok(Self::new(SigningKey::from_bytes(&seed), ttl))
    }

    /// Load the key from `CSRF_SIGNING_KEY_HEX`, or generate one.
    ///
    /// A generated key invalidates every outstanding token on restart.
    pub fn load_or_generate(seed_hex: Option<&str>, ttl: Duration) -> Result<Self, CsrfKeyError> {
        match seed_hex {
            Some(hex) => Self::from_hex_seed(hex, ttl),
            None => {
                tracing::warn!(
                    "CSRF_SIGNING_KEY_HEX not set, generating ephemeral key; \
                     issued tokens will not survive a restart"
                );
                Ok(Self::new(SigningKey::generate(&mut OsRng), ttl))
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token bound to `admin_id`.
    pub fn issue(&self, admin_id: &str) -> String {
        self.issue_at(admin_id, Utc::now())
    }

    pub(crate) fn issue_at(&self, admin_id: &str, now: DateTime<Utc>) -> String {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        let issued_at = now.timestamp();
        let nonce_hex = hex::encode(nonce);
        let sig = self
            .signing_key
            .sign(signed_message(admin_id, issued_at, &nonce_hex).as_bytes());
        format!("{issued_at}.{nonce_hex}.{}", hex::encode(sig.to_bytes()))
    }

    /// Verify a token for `admin_id` at the current time.
    pub fn verify(&self, token: &str, admin_id: &str) -> Result<(), CsrfError> {
        self.verify_at(token, admin_id, Utc::now())
    }

    pub(crate) fn verify_at(
        &self,
        token: &str,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CsrfError> {
        let mut parts = token.trim().split('.');
        let (Some(ts), Some(nonce_hex), Some(sig_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CsrfError::Malformed);
        };
        let issued_at: i64 = ts.parse().map_err(|_| CsrfError::Malformed)?;
        let nonce = hex::decode(nonce_hex).map_err(|_| CsrfError::Malformed)?;
        if nonce.len() != 16 {
            return Err(CsrfError::Malformed);
        }
        let sig_bytes = hex::decode(sig_hex).map_err(|_| CsrfError::Malformed)?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|_| CsrfError::Malformed)?;

        self.verifying_key
            .verify(
                signed_message(admin_id, issued_at, nonce_hex).as_bytes(),
                &signature,
            )
            .map_err(|_| CsrfError::BadSignature)?;

        let now = now.timestamp();
        if issued_at > now + MAX_SKEW_SECS {
            return Err(CsrfError::Malformed);
        }
        if now - issued_at > self.ttl.num_seconds() {
            return Err(CsrfError::Expired);
        }
        Ok(())
    }
}

fn signed_message(admin_id: &str, issued_at: i64, nonce_hex: &str) -> String {
    format!("csrf:{admin_id}:{issued_at}:{nonce_hex}")
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Reject state-changing requests without a valid `X-CSRF-TOKEN`.
///
/// Runs after [`crate::auth::auth_middleware`]; the token must have been
/// issued to the same administrator. Safe methods pass through. Rejection
/// happens before the handler runs, so a refused call changes nothing.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let Some(signer) = request.extensions().get::<CsrfSigner>().cloned() else {
        return AppError::Internal("CSRF signer not configured".into()).into_response();
    };
    let admin_id = request
        .extensions()
        .get::<AdminIdentity>()
        .map(|a| a.admin_id.clone());
    let Some(admin_id) = admin_id else {
        return AppError::Unauthorized("no admin identity in request context".into())
            .into_response();
    };

    let token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());

    let verdict = match token {
        Some(t) => signer.verify(t, &admin_id),
        None => Err(CsrfError::Missing),
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                admin_id = %admin_id,
                method = %request.method(),
                path = %request.uri().path(),
                reason = %err,
                "CSRF rejection"
            );
            AppError::from(err).into_response()
        }
    }
}
