//! # Asset Types
//!
//! Identifiers, accepted content types, upload contexts and the metadata
//! record the asset store keeps for each committed file.
//!
//! ## Security Invariant
//!
//! [`AssetId`] and [`AssetContext`] are only constructible through
//! validating parsers. Both are used as path components by the filesystem
//! backend, so the accepted alphabets exclude `/`, `\` and `.` sequences
//! that could escape the upload directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::digest::ContentDigest;
use crate::error::ValidationError;

/// Per-file upload ceiling: 4 MiB. A file of exactly this size is accepted.
pub const MAX_ASSET_BYTES: u64 = 4 * 1024 * 1024;

/// Context used when none is given.
pub const DEFAULT_CONTEXT: &str = "study-items";

// ── Content type ─────────────────────────────────────────────────────

/// Image types accepted by the upload surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ContentType {
    /// Parse a declared MIME type. Parameters after `;` are ignored,
    /// the type itself is matched case-insensitively.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("image/png") {
            Some(Self::Png)
        } else if essence.eq_ignore_ascii_case("image/jpeg") {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// Guess from a file extension (`png`, `jpg`, `jpeg`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Extension used in minted identifiers.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

/// Check a declared type and payload length against the upload rules.
///
/// Runs before anything is staged, so a rejection never leaves a partial
/// commit behind.
pub fn validate_upload(declared: Option<&str>, len: u64) -> Result<ContentType, ValidationError> {
    validate_upload_limited(declared, len, MAX_ASSET_BYTES)
}

/// [`validate_upload`] with a deployment-specific ceiling.
///
/// `limit` is clamped to [`MAX_ASSET_BYTES`]; configuration can lower the
/// ceiling but never raise it.
pub fn validate_upload_limited(
    declared: Option<&str>,
    len: u64,
    limit: u64,
) -> Result<ContentType, ValidationError> {
    let limit = limit.min(MAX_ASSET_BYTES);
    if len > limit {
        return Err(ValidationError::TooLarge { size: len, limit });
    }
    let declared = declared.ok_or(ValidationError::MissingContentType)?;
    ContentType::from_mime(declared).ok_or_else(|| ValidationError::UnsupportedType {
        declared: declared.to_string(),
    })
}

// ── Context ──────────────────────────────────────────────────────────

/// Namespace an asset belongs to, e.g. `study-items`.
///
/// Lowercase ASCII letters, digits, `-` and `_`; 1 to 64 characters,
/// starting with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AssetContext(String);

impl AssetContext {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let bytes = s.as_bytes();
        let valid = !bytes.is_empty()
            && bytes.len() <= 64
            && bytes[0].is_ascii_alphanumeric()
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::MalformedContext(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AssetContext {
    fn default() -> Self {
        Self(DEFAULT_CONTEXT.to_string())
    }
}

impl std::fmt::Display for AssetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AssetContext {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for AssetContext {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ── Identifier ───────────────────────────────────────────────────────

/// Opaque, server-minted asset identifier: `{32 lowercase hex}.{png|jpg}`.
///
/// Minted from a fresh v4 UUID, so an identifier is never handed out twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Mint a new identifier for the given content type.
    pub fn mint(content_type: ContentType) -> Self {
        Self(format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            content_type.extension()
        ))
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedIdentifier(s.to_string());
        let (stem, ext) = s.split_once('.').ok_or_else(malformed)?;
        let stem_ok = stem.len() == 32
            && stem
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !stem_ok || !matches!(ext, "png" | "jpg") {
            return Err(malformed());
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content type implied by the extension.
    pub fn content_type(&self) -> ContentType {
        if self.0.ends_with(".png") {
            ContentType::Png
        } else {
            ContentType::Jpeg
        }
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AssetId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ── Metadata ─────────────────────────────────────────────────────────

/// Everything the store records about a committed asset besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub identifier: AssetId,
    pub context: AssetContext,
    pub content_type: ContentType,
    pub size_bytes: u64,
    pub digest: ContentDigest,
    /// Client-supplied filename, kept for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Monotonic commit sequence; defines reconciliation order.
    pub seq: u64,
}
