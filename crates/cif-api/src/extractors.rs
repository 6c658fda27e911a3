//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! and validate JSON bodies and path segments in handlers.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use cif_core::{AssetContext, AssetId, PageKind};

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Parse the `{context}` path segment.
pub fn parse_context(raw: &str) -> Result<AssetContext, AppError> {
    AssetContext::parse(raw).map_err(|e| AppError::NotFound(e.to_string()))
}

/// Parse an identifier from a path or body. Malformed identifiers cannot
/// name a stored asset, so they are reported as not found.
pub fn parse_identifier(raw: &str) -> Result<AssetId, AppError> {
    AssetId::parse(raw.trim()).map_err(|e| AppError::NotFound(e.to_string()))
}

pub fn parse_page(raw: &str) -> Result<PageKind, AppError> {
    PageKind::parse(raw).map_err(|e| AppError::NotFound(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_path_segments_are_not_found() {
        assert!(matches!(parse_context("../x"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_identifier("a.png"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_page("about"), Err(AppError::NotFound(_))));
        assert!(parse_context("study-items").is_ok());
        assert!(parse_page("thank_you").is_ok());
    }

    #[test]
    fn identifier_is_trimmed() {
        let id = AssetId::mint(cif_core::ContentType::Jpeg);
        assert_eq!(parse_identifier(&format!("  {id}\n")).unwrap(), id);
    }
}
