//! # cif-client — Typed client for the admin asset API
//!
//! - [`AssetClient`]: one method per HTTP call of the upload protocol,
//!   plus the markdown page endpoints.
//! - [`LifecycleController`]: the upload widget's state, driving the
//!   client for each added or removed file.
//! - [`FormSubmitter`]: one-shot guarded saves.
//!
//! The CSRF token is read once from the upload page
//! ([`AssetClient::fetch_csrf_token`]) and passed to every mutating call.

pub mod assets;
pub mod config;
pub mod controller;
pub mod error;
pub mod forms;

pub use assets::{AssetClient, CsrfToken, LoadedAsset, PageText, ProcessResult, SaveResult, UploadFile};
pub use config::ClientConfig;
pub use controller::{EntryId, LifecycleController, Reconciliation, RemoveOutcome};
pub use error::ClientError;
pub use forms::{FormSubmitter, SubmitError};
