//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Asset store** — committed bytes + metadata, memory or filesystem.
//! - **Upload sessions** — in-flight upload tracking, sole writer of the store.
//! - **Pages** — markdown text of the editable pages.
//! - **CSRF signer** — issues and verifies mutation tokens.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use cif_core::MAX_ASSET_BYTES;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{AssetBackend, FsBackend, MemoryBackend};
use crate::csrf::{CsrfKeyError, CsrfSigner};
use crate::pages::PageStore;
use crate::sessions::UploadSessionManager;
use crate::store::{AssetStore, StoreError};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and never held across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Atomically read-validate-update a record under one write lock.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Configuration ------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_MINUTES: i64 = 240;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Application configuration.
///
/// Custom `Debug` redacts secrets.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Admin bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Filesystem backend root. If `None`, assets are kept in memory.
    pub upload_dir: Option<PathBuf>,
    /// Hex-encoded 32-byte CSRF signing seed. Generated when absent.
    pub csrf_key_hex: Option<String>,
    /// CSRF token lifetime in minutes.
    pub session_minutes: i64,
    /// Per-file upload ceiling in bytes, at most 4 MiB.
    pub max_content_length: u64,
    /// Emit JSON log lines.
    pub log_json: bool,
    /// Mount `/metrics` and the metrics middleware.
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("upload_dir", &self.upload_dir)
            .field("csrf_key_hex", &self.csrf_key_hex.as_ref().map(|_| "[REDACTED]"))
            .field("session_minutes", &self.session_minutes)
            .field("max_content_length", &self.max_content_length)
            .field("log_json", &self.log_json)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth_token: None,
            upload_dir: None,
            csrf_key_hex: None,
            session_minutes: DEFAULT_SESSION_MINUTES,
            max_content_length: MAX_ASSET_BYTES,
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_var("PORT", get("PORT"), DEFAULT_PORT)?;
        let session_minutes =
            parse_var("SESSION_MINUTES_VALIDITY", get("SESSION_MINUTES_VALIDITY"), DEFAULT_SESSION_MINUTES)?;
        if session_minutes <= 0 {
            return Err(ConfigError::InvalidVar {
                name: "SESSION_MINUTES_VALIDITY",
                value: session_minutes.to_string(),
                reason: "must be positive".into(),
            });
        }
        let max_content_length =
            parse_var("MAX_CONTENT_LENGTH", get("MAX_CONTENT_LENGTH"), MAX_ASSET_BYTES)?;
        if max_content_length > MAX_ASSET_BYTES {
            return Err(ConfigError::InvalidVar {
                name: "MAX_CONTENT_LENGTH",
                value: max_content_length.to_string(),
                reason: format!("must not exceed {MAX_ASSET_BYTES}"),
            });
        }
        let metrics_enabled = parse_var("CIF_METRICS_ENABLED", get("CIF_METRICS_ENABLED"), true)?;
        let log_json = get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            upload_dir: get("IMAGE_UPLOAD_DIR").map(PathBuf::from),
            csrf_key_hex: get("CSRF_SIGNING_KEY_HEX"),
            session_minutes,
            max_content_length,
            log_json,
            metrics_enabled,
        })
    }
}

// -- Application State --------------------------------------------------------

#[derive(Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    CsrfKey(#[from] CsrfKeyError),
}

/// Shared application state accessible to all route handlers.
///
/// Clone-friendly via `Arc` internals.
#[derive(Debug, Clone)]
pub struct AppState {
    pub sessions: UploadSessionManager,
    pub pages: PageStore,
    pub csrf: CsrfSigner,
    pub config: AppConfig,
}

impl AppState {
    /// Build state from configuration: opens the backend, hydrates the
    /// asset index and loads the CSRF key.
    pub fn try_with_config(config: AppConfig) -> Result<Self, InitError> {
        let backend: Arc<dyn AssetBackend> = match &config.upload_dir {
            Some(dir) => Arc::new(FsBackend::open(dir)?),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::try_with_backend(config, backend)
    }

    /// Build state over an explicit backend.
    pub fn try_with_backend(
        config: AppConfig,
        backend: Arc<dyn AssetBackend>,
    ) -> Result<Self, InitError> {
        let store = AssetStore::open(backend)?;
        let csrf = CsrfSigner::load_or_generate(
            config.csrf_key_hex.as_deref(),
            chrono::Duration::minutes(config.session_minutes),
        )?;
        Ok(Self {
            sessions: UploadSessionManager::new(store, config.max_content_length),
            pages: PageStore::new(),
            csrf,
            config,
        })
    }

    pub fn assets(&self) -> &AssetStore {
        self.sessions.store()
    }
}
