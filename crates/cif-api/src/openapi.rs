//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CIF Admin Asset API",
        version = "0.1.0",
        description = "Administrator media upload protocol and content page editing."
    ),
    paths(
        // Assets
        crate::routes::assets::upload_page,
        crate::routes::assets::process,
        crate::routes::assets::revert,
        crate::routes::assets::load,
        crate::routes::assets::current_files,
        crate::routes::assets::current,
        crate::routes::assets::confirm,
        // Pages
        crate::routes::pages::get_page,
        crate::routes::pages::save_page,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::assets::ProcessResponse,
        crate::routes::assets::RevertRequest,
        crate::routes::assets::RevertResponse,
        crate::routes::assets::CurrentFilesResponse,
        crate::routes::assets::CurrentResponse,
        crate::routes::assets::ConfirmResponse,
        crate::routes::pages::PageResponse,
        crate::routes::pages::SavePageRequest,
        crate::routes::pages::SavePageResponse,
    )),
    tags(
        (name = "assets", description = "Upload, revert, load and reconcile media assets"),
        (name = "pages", description = "Participant-facing markdown pages"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
