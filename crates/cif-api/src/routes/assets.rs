//! # Asset Upload API
//!
//! HTTP surface of the upload protocol under `/admin/assets/{context}`.
//!
//! | Call          | Method        | Path                    |
//! |---------------|---------------|-------------------------|
//! | upload page   | GET           | `/`                     |
//! | process       | POST          | `/process`              |
//! | revert        | DELETE, POST  | `/revert`               |
//! | load          | GET           | `/load/{identifier}`    |
//! | current-files | GET           | `/current-files`        |
//! | current       | GET           | `/current`              |
//! | confirm       | POST          | `/confirm`              |
//!
//! Mutating calls are guarded by the CSRF middleware before they get here.

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use cif_core::encode_filenames;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AdminIdentity;
use crate::csrf::CSRF_FIELD;
use crate::error::AppError;
use crate::extractors::{parse_context, parse_identifier};
use crate::sessions::{IncomingFile, RevertOutcome};
use crate::state::AppState;

/// Room for multipart boundaries and part headers above the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the asset router. `max_file_bytes` sizes the request body limit
/// of the process route.
pub fn router(max_file_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/admin/assets/:context", get(upload_page))
        .route(
            "/admin/assets/:context/process",
            post(process).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/admin/assets/:context/revert",
            post(revert).delete(revert),
        )
        .route("/admin/assets/:context/load/:identifier", get(load))
        .route("/admin/assets/:context/current-files", get(current_files))
        .route("/admin/assets/:context/current", get(current))
        .route("/admin/assets/:context/confirm", post(confirm))
}

// -- DTOs ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    /// Server-minted asset identifier.
    pub identifier: String,
    /// The bytes were already committed in this context.
    pub deduplicated: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevertRequest {
    pub identifier: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevertResponse {
    pub identifier: String,
    /// `false` when the asset was already absent.
    pub reverted: bool,
}

/// Legacy reconciliation body: `{"filenames": "a.png|b.jpg|"}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentFilesResponse {
    pub filenames: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentResponse {
    pub context: String,
    /// Committed identifiers in commit order.
    pub identifiers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmResponse {
    pub context: String,
    pub confirmed: usize,
}

// -- Handlers -----------------------------------------------------------------

fn size_label(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}

/// GET /admin/assets/{context} — Upload page carrying the CSRF token.
#[utoipa::path(
    get,
    path = "/admin/assets/{context}",
    params(("context" = String, Path, description = "Upload context, e.g. study-items")),
    responses(
        (status = 200, description = "HTML upload page with hidden csrf_token input", content_type = "text/html"),
        (status = 404, description = "Malformed context", body = crate::error::ErrorBody),
    ),
    tag = "assets"
)]
async fn upload_page(
    State(state): State<AppState>,
    Path(context): Path<String>,
    admin: AdminIdentity,
) -> Result<Html<String>, AppError> {
    let context = parse_context(&context)?;
    let token = state.csrf.issue(&admin.admin_id);
    let base = format!("/admin/assets/{context}");
    let max_size = size_label(state.config.max_content_length);

    Ok(Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Upload items: {context}</title>
</head>
<body>
<h1>Upload items</h1>
<form id="upload-form" method="post" action="{base}/confirm">
<input type="hidden" name="{CSRF_FIELD}" value="{token}">
<input type="file" class="filepond" name="filepond" multiple
  data-max-file-size="{max_size}"
  data-accepted-file-types="image/png, image/jpeg"
  data-server-process="{base}/process"
  data-server-revert="{base}/revert"
  data-server-load="{base}/load/"
  data-current-files="{base}/current-files"
  data-csrf-header="X-CSRF-TOKEN">
<button type="submit">Save</button>
</form>
</body>
</html>
"#
    )))
}

fn multipart_error(err: MultipartError, limit: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation(format!(
            "file is too large: exceeds the {limit} byte limit"
        ))
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// POST /admin/assets/{context}/process — Upload one file (multipart).
///
/// The first part with a filename or content type is taken as the file.
#[utoipa::path(
    post,
    path = "/admin/assets/{context}/process",
    params(("context" = String, Path, description = "Upload context")),
    responses(
        (status = 200, description = "Asset committed (or existing duplicate)", body = ProcessResponse),
        (status = 403, description = "CSRF token rejected", body = crate::error::ErrorBody),
        (status = 422, description = "Unsupported type or file too large", body = crate::error::ErrorBody),
    ),
    tag = "assets"
)]
async fn process(
    State(state): State<AppState>,
    Path(context): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let context = parse_context(&context)?;
    let limit = state.config.max_content_length;
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut incoming = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.file_name().is_none() && field.content_type().is_none() {
            continue;
        }
        let declared_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        incoming = Some(IncomingFile {
            bytes,
            declared_type,
            file_name,
        });
        break;
    }
    let file = incoming.ok_or(cif_core::ValidationError::MissingFile)?;

    let outcome = state.sessions.process(&context, file).await?;
    Ok(Json(ProcessResponse {
        identifier: outcome.identifier.to_string(),
        deduplicated: outcome.deduplicated,
    }))
}

fn revert_target(headers: &HeaderMap, body: &[u8]) -> Result<String, AppError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let raw = if is_json {
        serde_json::from_slice::<RevertRequest>(body)
            .map_err(|e| AppError::BadRequest(format!("invalid revert body: {e}")))?
            .identifier
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| AppError::BadRequest("revert body is not UTF-8".into()))?
    };
    let raw = raw.trim().to_string();
    if raw.is_empty() {
        return Err(AppError::BadRequest("missing identifier".into()));
    }
    Ok(raw)
}

/// DELETE|POST /admin/assets/{context}/revert — Remove an uploaded asset.
///
/// Body is `{"identifier": "..."}` or the bare identifier as text.
/// Reverting an absent asset succeeds with `reverted: false`.
#[utoipa::path(
    delete,
    path = "/admin/assets/{context}/revert",
    params(("context" = String, Path, description = "Upload context")),
    request_body = RevertRequest,
    responses(
        (status = 200, description = "Reverted or already absent", body = RevertResponse),
        (status = 400, description = "Missing or malformed identifier", body = crate::error::ErrorBody),
        (status = 403, description = "CSRF token rejected", body = crate::error::ErrorBody),
    ),
    tag = "assets"
)]
async fn revert(
    State(state): State<AppState>,
    Path(context): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RevertResponse>, AppError> {
    let context = parse_context(&context)?;
    let raw = revert_target(&headers, &body)?;
    let identifier = cif_core::AssetId::parse(&raw)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state.sessions.revert(&context, &identifier).await?;
    Ok(Json(RevertResponse {
        identifier: identifier.to_string(),
        reverted: outcome == RevertOutcome::Reverted,
    }))
}

/// GET /admin/assets/{context}/load/{identifier} — Raw bytes of an asset.
#[utoipa::path(
    get,
    path = "/admin/assets/{context}/load/{identifier}",
    params(
        ("context" = String, Path, description = "Upload context"),
        ("identifier" = String, Path, description = "Asset identifier"),
    ),
    responses(
        (status = 200, description = "Asset bytes with their content type"),
        (status = 404, description = "Unknown or reverted asset", body = crate::error::ErrorBody),
    ),
    tag = "assets"
)]
async fn load(
    State(state): State<AppState>,
    Path((context, identifier)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let context = parse_context(&context)?;
    let identifier = parse_identifier(&identifier)?;
    let (meta, bytes) = state.sessions.load(&context, &identifier).await?;
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type.mime().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", meta.identifier),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    ))
}

/// GET /admin/assets/{context}/current-files — Legacy pipe-delimited list.
#[utoipa::path(
    get,
    path = "/admin/assets/{context}/current-files",
    params(("context" = String, Path, description = "Upload context")),
    responses(
        (status = 200, description = "Committed identifiers as `a|b|`", body = CurrentFilesResponse),
    ),
    tag = "assets"
)]
async fn current_files(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> Result<Json<CurrentFilesResponse>, AppError> {
    let context = parse_context(&context)?;
    let ids = state.sessions.list_current(&context);
    Ok(Json(CurrentFilesResponse {
        filenames: encode_filenames(ids.iter().map(|id| id.as_str())),
    }))
}

/// GET /admin/assets/{context}/current — Structured reconciliation list.
#[utoipa::path(
    get,
    path = "/admin/assets/{context}/current",
    params(("context" = String, Path, description = "Upload context")),
    responses(
        (status = 200, description = "Committed identifiers in commit order", body = CurrentResponse),
    ),
    tag = "assets"
)]
async fn current(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> Result<Json<CurrentResponse>, AppError> {
    let context = parse_context(&context)?;
    let identifiers = state
        .sessions
        .list_current(&context)
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    Ok(Json(CurrentResponse {
        context: context.to_string(),
        identifiers,
    }))
}

/// POST /admin/assets/{context}/confirm — Keep all committed uploads.
#[utoipa::path(
    post,
    path = "/admin/assets/{context}/confirm",
    params(("context" = String, Path, description = "Upload context")),
    responses(
        (status = 200, description = "Sessions confirmed", body = ConfirmResponse),
        (status = 403, description = "CSRF token rejected", body = crate::error::ErrorBody),
    ),
    tag = "assets"
)]
async fn confirm(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let context = parse_context(&context)?;
    let confirmed = state.sessions.confirm(&context);
    Ok(Json(ConfirmResponse {
        context: context.to_string(),
        confirmed,
    }))
}
