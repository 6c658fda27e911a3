//! # Error Types
//!
//! Validation errors raised while interpreting upload requests, asset
//! identifiers and page content. All errors use `thiserror` for
//! derive-based `Display` and `Error` implementations.
//!
//! Messages are safe to surface to an administrator verbatim; they never
//! contain file contents or secrets.

use thiserror::Error;

/// A request or value was rejected before any state was touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The payload exceeds the per-file size limit.
    #[error("file is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Observed payload size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The declared content type is not an accepted image type.
    #[error("unsupported file type '{declared}'; accepted types are image/png and image/jpeg")]
    UnsupportedType {
        /// The MIME type the client declared.
        declared: String,
    },

    /// No content type was declared for the file part.
    #[error("file part has no content type")]
    MissingContentType,

    /// The request did not carry a file part.
    #[error("request contains no file")]
    MissingFile,

    /// An asset identifier did not match the `{hex}.{ext}` shape.
    #[error("malformed asset identifier '{0}'")]
    MalformedIdentifier(String),

    /// A context slug contained characters outside `[a-z0-9_-]`.
    #[error("malformed upload context '{0}'")]
    MalformedContext(String),

    /// A page name did not match any known page.
    #[error("unknown page '{0}'")]
    UnknownPage(String),

    /// Markdown page text was empty after trimming.
    #[error("page text must not be empty")]
    EmptyPageText,
}
