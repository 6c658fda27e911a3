//! End-to-end: the client stack against a real cif-api server on an
//! ephemeral port.

use cif_api::state::{AppConfig, AppState};
use cif_client::{
    AssetClient, ClientConfig, ClientError, CsrfToken, FormSubmitter, LifecycleController,
    RemoveOutcome, SubmitError, UploadFile,
};
use cif_core::PageKind;
use cif_state::{EntryOrigin, EntryState, GuardError};

async fn spawn_server(config: AppConfig) -> String {
    let state = AppState::try_with_config(config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, cif_api::app(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str) -> AssetClient {
    AssetClient::new(ClientConfig::new(base_url).unwrap()).unwrap()
}

fn photo(len: usize) -> Vec<u8> {
    let mut bytes = vec![3u8; len];
    bytes[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
    bytes
}

#[tokio::test]
async fn photo_lifecycle_through_controller() {
    let base = spawn_server(AppConfig::default()).await;
    let ctl = LifecycleController::boot(client(&base)).await.unwrap();
    assert!(ctl.is_empty());

    let bytes = photo(3 * 1024 * 1024);
    let entry_id = ctl.add_file(UploadFile::new("photo.png", "image/png", bytes.clone()));
    ctl.settle().await;

    let entry = ctl.entry(entry_id).unwrap();
    assert_eq!(entry.state, EntryState::Committed);
    let identifier = entry.identifier.unwrap();
    assert_eq!(ctl.client().current_files().await.unwrap(), vec![identifier.clone()]);
    assert!(ctl.reconcile().await.unwrap().is_consistent());

    let loaded = ctl.client().load(&identifier).await.unwrap();
    assert_eq!(loaded.content_type.as_deref(), Some("image/png"));
    assert_eq!(loaded.bytes, bytes);

    assert_eq!(ctl.remove(entry_id).await.unwrap(), RemoveOutcome::Reverted);
    assert!(ctl.client().current_files().await.unwrap().is_empty());
    assert!(matches!(
        ctl.client().load(&identifier).await,
        Err(ClientError::NotFound { .. })
    ));
}

#[tokio::test]
async fn rebooted_controller_sees_committed_uploads_in_limbo() {
    let base = spawn_server(AppConfig::default()).await;
    let first = LifecycleController::boot(client(&base)).await.unwrap();
    first.add_file(UploadFile::new("a.png", "image/png", photo(128)));
    first.settle().await;
    first.add_file(UploadFile::new("b.jpg", "image/jpeg", b"\xff\xd8\xffjpeg".to_vec()));
    first.settle().await;

    let second = LifecycleController::boot(client(&base)).await.unwrap();
    let entries = second.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|(_, e)| e.origin == EntryOrigin::Limbo));
    assert_eq!(second.committed_identifiers(), first.committed_identifiers());
}

#[tokio::test]
async fn duplicate_upload_is_deduplicated() {
    let base = spawn_server(AppConfig::default()).await;
    let api = client(&base);
    let token = api.fetch_csrf_token().await.unwrap();
    let file = UploadFile::new("a.png", "image/png", photo(512));

    let first = api.process(&token, file.clone()).await.unwrap();
    let second = api.process(&token, file).await.unwrap();
    assert_eq!(first.identifier, second.identifier);
    assert!(second.deduplicated);
    assert_eq!(api.list_current().await.unwrap().len(), 1);
}

#[tokio::test]
async fn removing_one_of_two_identical_uploads_keeps_the_asset() {
    let base = spawn_server(AppConfig::default()).await;
    let ctl = LifecycleController::boot(client(&base)).await.unwrap();
    let bytes = photo(256);

    let a = ctl.add_file(UploadFile::new("a.png", "image/png", bytes.clone()));
    ctl.settle().await;
    let b = ctl.add_file(UploadFile::new("b.png", "image/png", bytes.clone()));
    ctl.settle().await;
    let shared = ctl.entry(a).unwrap().identifier.unwrap();
    assert_eq!(ctl.entry(b).unwrap().identifier, Some(shared.clone()));

    assert_eq!(ctl.remove(b).await.unwrap(), RemoveOutcome::Detached);
    assert_eq!(ctl.entry(a).unwrap().state, EntryState::Committed);
    assert_eq!(ctl.client().current_files().await.unwrap(), vec![shared.clone()]);
    assert_eq!(ctl.client().load(&shared).await.unwrap().bytes, bytes);
    assert!(ctl.reconcile().await.unwrap().is_consistent());

    assert_eq!(ctl.remove(a).await.unwrap(), RemoveOutcome::Reverted);
    assert!(ctl.client().current_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_type_is_validation_error() {
    let base = spawn_server(AppConfig::default()).await;
    let api = client(&base);
    let token = api.fetch_csrf_token().await.unwrap();

    let err = api
        .process(&token, UploadFile::new("notes.txt", "text/plain", b"hello".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { .. }));
    assert!(api.current_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_token_fails_closed() {
    let base = spawn_server(AppConfig::default()).await;
    let api = client(&base);
    let bogus = CsrfToken::new("1.00.00");

    let err = api
        .process(&bogus, UploadFile::new("a.png", "image/png", photo(64)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Auth { status: 403, .. }));
    assert!(!err.is_retryable());
    assert!(api.current_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_credentials_are_required_when_configured() {
    let base = spawn_server(AppConfig {
        auth_token: Some("secret".into()),
        ..AppConfig::default()
    })
    .await;

    let anonymous = client(&base);
    assert!(matches!(
        anonymous.fetch_csrf_token().await,
        Err(ClientError::Auth { status: 401, .. })
    ));

    let admin = AssetClient::new(ClientConfig::new(&base).unwrap().with_admin_token("alice:secret")).unwrap();
    let token = admin.fetch_csrf_token().await.unwrap();
    admin
        .process(&token, UploadFile::new("a.png", "image/png", photo(64)))
        .await
        .unwrap();
}

#[tokio::test]
async fn page_form_submits_once() {
    let base = spawn_server(AppConfig::default()).await;
    let api = client(&base);
    let token = api.fetch_csrf_token().await.unwrap();

    let form = FormSubmitter::new(api.clone(), token.clone());
    let saved = form.save_page(PageKind::Ethics, "# Ethics").await.unwrap();
    assert!(saved.changed);
    assert_eq!(saved.revision, 1);
    assert!(matches!(
        form.save_page(PageKind::Ethics, "# Ethics").await,
        Err(SubmitError::Guard(GuardError::AlreadySubmitted))
    ));

    let reloaded = FormSubmitter::new(api.clone(), token);
    let saved = reloaded.save_page(PageKind::Ethics, "# Ethics").await.unwrap();
    assert!(!saved.changed);
    assert_eq!(saved.revision, 1);
    assert_eq!(api.get_page(PageKind::Ethics).await.unwrap().md_text, "# Ethics");
}

#[tokio::test]
async fn rejected_page_save_releases_the_form() {
    let base = spawn_server(AppConfig::default()).await;
    let api = client(&base);
    let token = api.fetch_csrf_token().await.unwrap();

    let form = FormSubmitter::new(api, token);
    let err = form.save_page(PageKind::Introduction, "   ").await.unwrap_err();
    assert!(matches!(err, SubmitError::Client(ClientError::Validation { .. })));
    assert!(!form.is_submitted());
    form.save_page(PageKind::Introduction, "Welcome").await.unwrap();
    assert!(form.is_submitted());
}

#[tokio::test]
async fn confirm_uploads_counts_sessions() {
    let base = spawn_server(AppConfig::default()).await;
    let ctl = LifecycleController::boot(client(&base)).await.unwrap();
    ctl.add_file(UploadFile::new("a.png", "image/png", photo(64)));
    ctl.settle().await;

    let form = FormSubmitter::new(ctl.client().clone(), ctl.token().clone());
    assert_eq!(form.confirm_uploads().await.unwrap(), 1);
    assert_eq!(ctl.client().current_files().await.unwrap().len(), 1);
}
