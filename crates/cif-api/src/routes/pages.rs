//! Markdown content pages under `/admin/pages/{page}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, parse_page, Validate};
use crate::pages::PageRecord;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/pages/:page", get(get_page).put(save_page))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageResponse {
    pub page: String,
    pub md_text: String,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PageRecord> for PageResponse {
    fn from(record: PageRecord) -> Self {
        Self {
            page: record.page.as_str().to_string(),
            md_text: record.md_text,
            revision: record.revision,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SavePageRequest {
    pub md_text: String,
}

impl Validate for SavePageRequest {
    fn validate(&self) -> Result<(), String> {
        cif_core::validate_page_text(&self.md_text).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SavePageResponse {
    pub page: String,
    /// `false` when the submitted text equals the stored text.
    pub changed: bool,
    pub revision: u64,
}

/// GET /admin/pages/{page} — Current markdown of a content page.
#[utoipa::path(
    get,
    path = "/admin/pages/{page}",
    params(("page" = String, Path, description = "introduction, ethics, thank_you or site_policies")),
    responses(
        (status = 200, description = "Page text", body = PageResponse),
        (status = 404, description = "Unknown page", body = crate::error::ErrorBody),
    ),
    tag = "pages"
)]
async fn get_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Json<PageResponse>, AppError> {
    let page = parse_page(&page)?;
    Ok(Json(state.pages.get(page).into()))
}

/// PUT /admin/pages/{page} — Replace the markdown of a content page.
#[utoipa::path(
    put,
    path = "/admin/pages/{page}",
    params(("page" = String, Path, description = "introduction, ethics, thank_you or site_policies")),
    request_body = SavePageRequest,
    responses(
        (status = 200, description = "Page saved", body = SavePageResponse),
        (status = 403, description = "CSRF token rejected", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown page", body = crate::error::ErrorBody),
        (status = 422, description = "Empty page text", body = crate::error::ErrorBody),
    ),
    tag = "pages"
)]
async fn save_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
    body: Result<Json<SavePageRequest>, JsonRejection>,
) -> Result<Json<SavePageResponse>, AppError> {
    let page = parse_page(&page)?;
    let req = extract_validated_json(body)?;
    let outcome = state.pages.save(page, &req.md_text)?;
    tracing::info!(page = %page.as_str(), revision = outcome.revision, changed = outcome.changed, "page saved");
    Ok(Json(SavePageResponse {
        page: page.as_str().to_string(),
        changed: outcome.changed,
        revision: outcome.revision,
    }))
}
