//! # Integration Tests for cif-api
//!
//! Drives the full router with `oneshot`: the upload lifecycle, CSRF
//! rejection, deduplication, reconciliation lists, page editing,
//! authentication, metrics and the OpenAPI document.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use cif_api::state::{AppConfig, AppState};

const BOUNDARY: &str = "cif-test-boundary";
const SEED: &str = "0101010101010101010101010101010101010101010101010101010101010101";

/// Helper: build the test app with auth disabled and in-memory storage.
fn test_app() -> axum::Router {
    test_app_with(AppConfig::default())
}

fn test_app_with(config: AppConfig) -> axum::Router {
    let state = AppState::try_with_config(config).unwrap();
    cif_api::app(state)
}

/// Helper: build the test app with auth enabled.
fn test_app_with_auth(token: &str) -> axum::Router {
    test_app_with(AppConfig {
        auth_token: Some(token.to_string()),
        ..AppConfig::default()
    })
}

/// Helper: read response body as string.
async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn multipart(file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"filepond\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn png_bytes(len: usize, seed: u8) -> Vec<u8> {
    let mut bytes = vec![seed; len];
    bytes[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
    bytes
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Helper: fetch the upload page and pull the hidden CSRF token out of it.
async fn csrf_token(app: &axum::Router, context: &str) -> String {
    let response = app
        .clone()
        .oneshot(get(&format!("/admin/assets/{context}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    let marker = "name=\"csrf_token\" value=\"";
    let start = html.find(marker).expect("csrf input present") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

fn process_request(context: &str, token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/admin/assets/{context}/process"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("X-CSRF-TOKEN", token);
    }
    builder.body(Body::from(body)).unwrap()
}

fn revert_request(context: &str, token: Option<&str>, identifier: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/assets/{context}/revert"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("X-CSRF-TOKEN", token);
    }
    builder
        .body(Body::from(
            serde_json::json!({ "identifier": identifier }).to_string(),
        ))
        .unwrap()
}

async fn upload(app: &axum::Router, context: &str, token: &str, name: &str, mime: &str, bytes: &[u8]) -> Value {
    let response = app
        .clone()
        .oneshot(process_request(context, Some(token), multipart(name, mime, bytes)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn current_files(app: &axum::Router, context: &str) -> String {
    let response = app
        .clone()
        .oneshot(get(&format!("/admin/assets/{context}/current-files")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["filenames"]
        .as_str()
        .unwrap()
        .to_string()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let app = test_app();
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe() {
    let app = test_app();
    let response = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.starts_with("ready"));
}

// -- Upload Lifecycle ---------------------------------------------------------

#[tokio::test]
async fn test_full_lifecycle_of_three_mib_png() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let photo = png_bytes(3 * 1024 * 1024, 7);

    let processed = upload(&app, "study-items", &token, "photo.png", "image/png", &photo).await;
    let id = processed["identifier"].as_str().unwrap().to_string();
    assert!(id.ends_with(".png"));
    assert_ne!(id, "photo.png");
    assert_eq!(processed["deduplicated"], false);

    assert_eq!(current_files(&app, "study-items").await, format!("{id}|"));

    let response = app
        .clone()
        .oneshot(get(&format!("/admin/assets/study-items/load/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let loaded = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(loaded.as_ref(), photo.as_slice());

    let response = app
        .clone()
        .oneshot(revert_request("study-items", Some(&token), &id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["identifier"], id.as_str());
    assert_eq!(body["reverted"], true);

    let response = app
        .clone()
        .oneshot(get(&format!("/admin/assets/study-items/load/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_jpeg_gets_jpg_extension() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let processed = upload(&app, "study-items", &token, "cat.jpeg", "image/jpeg", b"\xff\xd8\xff jpeg").await;
    assert!(processed["identifier"].as_str().unwrap().ends_with(".jpg"));
}

#[tokio::test]
async fn test_five_mib_upload_is_rejected() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let big = png_bytes(5 * 1024 * 1024, 1);

    let response = app
        .clone()
        .oneshot(process_request("study-items", Some(&token), multipart("big.png", "image/png", &big)))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_configured_limit_rejects_with_validation_error() {
    let app = test_app_with(AppConfig {
        max_content_length: 1024,
        ..AppConfig::default()
    });
    let token = csrf_token(&app, "study-items").await;
    let response = app
        .clone()
        .oneshot(process_request(
            "study-items",
            Some(&token),
            multipart("a.png", "image/png", &png_bytes(2048, 3)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_unsupported_type_is_rejected() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let response = app
        .clone()
        .oneshot(process_request(
            "study-items",
            Some(&token),
            multipart("notes.txt", "text/plain", b"hello"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_missing_file_part_is_rejected() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(process_request("study-items", Some(&token), body.into_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_identical_bytes_are_deduplicated() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let bytes = png_bytes(1024, 9);

    let first = upload(&app, "study-items", &token, "one.png", "image/png", &bytes).await;
    let second = upload(&app, "study-items", &token, "two.png", "image/png", &bytes).await;
    assert_eq!(first["identifier"], second["identifier"]);
    assert_eq!(second["deduplicated"], true);

    let id = first["identifier"].as_str().unwrap();
    assert_eq!(current_files(&app, "study-items").await, format!("{id}|"));
}

#[tokio::test]
async fn test_current_lists_in_commit_order() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let mut ids = Vec::new();
    for seed in 1..=3u8 {
        let v = upload(&app, "study-items", &token, "x.png", "image/png", &png_bytes(64, seed)).await;
        ids.push(v["identifier"].as_str().unwrap().to_string());
    }

    let response = app
        .clone()
        .oneshot(get("/admin/assets/study-items/current"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["context"], "study-items");
    let listed: Vec<String> = body["identifiers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(listed, ids);

    let legacy = current_files(&app, "study-items").await;
    assert_eq!(legacy, format!("{}|{}|{}|", ids[0], ids[1], ids[2]));
}

#[tokio::test]
async fn test_double_revert_is_idempotent() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let v = upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(64, 4)).await;
    let id = v["identifier"].as_str().unwrap();

    for expected in [true, false] {
        let response = app
            .clone()
            .oneshot(revert_request("study-items", Some(&token), id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["reverted"], expected);
    }
}

#[tokio::test]
async fn test_revert_accepts_plain_text_post() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let v = upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(64, 5)).await;
    let id = v["identifier"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/assets/study-items/revert")
                .header(header::CONTENT_TYPE, "text/plain")
                .header("X-CSRF-TOKEN", &token)
                .body(Body::from(id.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["reverted"], true);
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_malformed_revert_identifier_is_bad_request() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let response = app
        .clone()
        .oneshot(revert_request("study-items", Some(&token), "../../etc/passwd"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contexts_are_isolated() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let v = upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(64, 6)).await;
    let id = v["identifier"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/admin/assets/other-items/load/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(revert_request("other-items", Some(&token), &id))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["reverted"], false);
    assert_eq!(current_files(&app, "study-items").await, format!("{id}|"));
    assert_eq!(current_files(&app, "other-items").await, "");
}

#[tokio::test]
async fn test_unknown_load_is_not_found() {
    let app = test_app();
    let response = app
        .oneshot(get(
            "/admin/assets/study-items/load/0123456789abcdef0123456789abcdef.png",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_confirm_counts_committed_sessions() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(64, 8)).await;

    let confirm = || {
        Request::builder()
            .method("POST")
            .uri("/admin/assets/study-items/confirm")
            .header("X-CSRF-TOKEN", &token)
            .body(Body::empty())
            .unwrap()
    };
    let body = body_json(app.clone().oneshot(confirm()).await.unwrap()).await;
    assert_eq!(body["confirmed"], 1);
    let body = body_json(app.clone().oneshot(confirm()).await.unwrap()).await;
    assert_eq!(body["confirmed"], 0);
    assert_ne!(current_files(&app, "study-items").await, "");
}

// -- CSRF ---------------------------------------------------------------------

#[tokio::test]
async fn test_process_without_csrf_token_is_forbidden() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(process_request(
            "study-items",
            None,
            multipart("a.png", "image/png", &png_bytes(64, 1)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "CSRF_REJECTED");
    assert_eq!(current_files(&app, "study-items").await, "");
}

#[tokio::test]
async fn test_forged_csrf_token_leaves_state_unchanged() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;
    let v = upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(64, 2)).await;
    let id = v["identifier"].as_str().unwrap().to_string();

    let mut forged = token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == '0' { '1' } else { '0' });

    for bad in [None, Some(forged.as_str()), Some("garbage")] {
        let response = app
            .clone()
            .oneshot(revert_request("study-items", bad, &id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    assert_eq!(current_files(&app, "study-items").await, format!("{id}|"));
}

#[tokio::test]
async fn test_csrf_token_is_bound_to_admin() {
    let app = test_app_with_auth("secret");
    let alice_page = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/assets/study-items")
                .header(header::AUTHORIZATION, "Bearer alice:secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_string(alice_page).await;
    let marker = "name=\"csrf_token\" value=\"";
    let start = html.find(marker).unwrap() + marker.len();
    let token = &html[start..start + html[start..].find('"').unwrap()];

    let request = |who: &str| {
        let mut req = process_request(
            "study-items",
            Some(token),
            multipart("a.png", "image/png", &png_bytes(64, 3)),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {who}:secret").parse().unwrap(),
        );
        req
    };
    let response = app.clone().oneshot(request("bob")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.clone().oneshot(request("alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_key_survives_restart() {
    let config = || AppConfig {
        csrf_key_hex: Some(SEED.to_string()),
        ..AppConfig::default()
    };
    let first = test_app_with(config());
    let token = csrf_token(&first, "study-items").await;

    let second = test_app_with(config());
    let response = second
        .oneshot(process_request(
            "study-items",
            Some(&token),
            multipart("a.png", "image/png", &png_bytes(64, 1)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Filesystem Backend -------------------------------------------------------

#[tokio::test]
async fn test_fs_backend_hydrates_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = || AppConfig {
        upload_dir: Some(dir.path().to_path_buf()),
        csrf_key_hex: Some(SEED.to_string()),
        ..AppConfig::default()
    };

    let app = test_app_with(config());
    let token = csrf_token(&app, "study-items").await;
    let a = upload(&app, "study-items", &token, "a.png", "image/png", &png_bytes(128, 1)).await;
    let b = upload(&app, "study-items", &token, "b.jpg", "image/jpeg", b"\xff\xd8\xffjpeg").await;
    drop(app);

    let restarted = test_app_with(config());
    assert_eq!(
        current_files(&restarted, "study-items").await,
        format!(
            "{}|{}|",
            a["identifier"].as_str().unwrap(),
            b["identifier"].as_str().unwrap()
        )
    );
}

// -- Pages --------------------------------------------------------------------

#[tokio::test]
async fn test_page_edit_round() {
    let app = test_app();
    let token = csrf_token(&app, "study-items").await;

    let response = app.clone().oneshot(get("/admin/pages/introduction")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["revision"], 0);

    let put = |text: &str, token: Option<&str>| {
        let mut builder = Request::builder()
            .method("PUT")
            .uri("/admin/pages/introduction")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header("X-CSRF-TOKEN", token);
        }
        builder
            .body(Body::from(serde_json::json!({ "md_text": text }).to_string()))
            .unwrap()
    };

    let response = app.clone().oneshot(put("# Hi", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(app.clone().oneshot(put("# Hi", Some(&token))).await.unwrap()).await;
    assert_eq!(body["changed"], true);
    assert_eq!(body["revision"], 1);

    let body = body_json(app.clone().oneshot(put("# Hi", Some(&token))).await.unwrap()).await;
    assert_eq!(body["changed"], false);
    assert_eq!(body["revision"], 1);

    let response = app.clone().oneshot(put("   ", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(app.clone().oneshot(get("/admin/pages/introduction")).await.unwrap()).await;
    assert_eq!(body["md_text"], "# Hi");
}

#[tokio::test]
async fn test_unknown_page_is_not_found() {
    let app = test_app();
    let response = app.oneshot(get("/admin/pages/about")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_auth_rejects_missing_token() {
    let app = test_app_with_auth("secret");
    let response = app
        .oneshot(get("/admin/assets/study-items/current-files"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_rejects_wrong_token() {
    let app = test_app_with_auth("secret");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/assets/study-items/current-files")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_skips_auth() {
    let app = test_app_with_auth("secret");
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Metrics & OpenAPI --------------------------------------------------------

#[tokio::test]
async fn test_metrics_counts_requests() {
    let app = test_app();
    app.clone()
        .oneshot(get("/admin/pages/about"))
        .await
        .unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("cif_requests_total"));
    assert!(text.contains("cif_errors_total 1"));
    assert!(text.contains("cif_assets 0"));
}

#[tokio::test]
async fn test_metrics_can_be_disabled() {
    let app = test_app_with(AppConfig {
        metrics_enabled: false,
        ..AppConfig::default()
    });
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_spec_served() {
    let app = test_app();
    let response = app.oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]
        .as_object()
        .unwrap()
        .contains_key("/admin/assets/{context}/process"));
}
