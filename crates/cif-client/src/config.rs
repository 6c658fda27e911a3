//! Client configuration.
//!
//! Points the client at a running admin asset service. Override via
//! environment variables or explicit construction for tests.

use cif_core::AssetContext;
use url::Url;
use zeroize::Zeroizing;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the admin asset service.
///
/// Custom `Debug` implementation redacts the `admin_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct ClientConfig {
    /// Service root, e.g. `http://127.0.0.1:8080`.
    pub base_url: Url,
    /// Bearer credential, `{admin_id}:{secret}` or `{secret}`.
    pub admin_token: Option<Zeroizing<String>>,
    /// Upload context all asset calls are scoped to.
    pub context: AssetContext,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("context", &self.context)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Config for `base_url` with defaults everywhere else.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_url("base_url", base_url)?,
            admin_token: None,
            context: AssetContext::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CIF_BASE_URL` (default: `http://127.0.0.1:8080`)
    /// - `CIF_ADMIN_TOKEN` (optional)
    /// - `CIF_CONTEXT` (default: `study-items`)
    /// - `CIF_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = parse_url(
            "CIF_BASE_URL",
            &get("CIF_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;
        let context = match get("CIF_CONTEXT") {
            Some(raw) => AssetContext::parse(raw.trim())
                .map_err(|e| ConfigError::InvalidContext(e.to_string()))?,
            None => AssetContext::default(),
        };
        let timeout_secs = match get("CIF_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            admin_token: get("CIF_ADMIN_TOKEN").map(Zeroizing::new),
            context,
            timeout_secs,
        })
    }

    pub fn with_context(mut self, context: AssetContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Zeroizing::new(token.into()));
        self
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(var.to_string(), "not a base URL".into()));
    }
    Ok(url)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid CIF_CONTEXT: {0}")]
    InvalidContext(String),
    #[error("invalid CIF_TIMEOUT_SECS: {0}")]
    InvalidTimeout(String),
    #[error("invalid admin token: not a valid header value")]
    InvalidToken,
}
