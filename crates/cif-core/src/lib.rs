//! # cif-core — Foundational Types for the Admin Asset Service
//!
//! Leaf crate of the workspace. Defines the validated newtypes and value
//! types shared by the server, the client and the CLI.
//!
//! ## Key Design Principles
//!
//! 1. **Validated newtypes for everything that becomes a path.** `AssetId`
//!    and `AssetContext` can only be built through their parsers.
//!
//! 2. **Upload rules in one place.** [`validate_upload`] is the single
//!    check for content type and the 4 MiB ceiling; server and client
//!    both call it.
//!
//! 3. **Content addressing for dedupe.** [`ContentDigest`] is the SHA-256
//!    of the raw bytes.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `cif-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod asset;
pub mod digest;
pub mod error;
pub mod legacy;
pub mod page;

pub use asset::{
    validate_upload, validate_upload_limited, AssetContext, AssetId, AssetMeta, ContentType,
    DEFAULT_CONTEXT, MAX_ASSET_BYTES,
};
pub use digest::ContentDigest;
pub use error::ValidationError;
pub use legacy::{encode_filenames, parse_filenames};
pub use page::{validate_page_text, PageKind};
