//! Typed client for the admin asset API.
//!
//! ## Paths (relative to the service root)
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/admin/assets/{context}` | Upload page (CSRF token source) |
//! | POST   | `/admin/assets/{context}/process` | Upload one file |
//! | DELETE | `/admin/assets/{context}/revert` | Remove an upload |
//! | GET    | `/admin/assets/{context}/load/{identifier}` | Fetch bytes |
//! | GET    | `/admin/assets/{context}/current-files` | Legacy reconciliation list |
//! | GET    | `/admin/assets/{context}/current` | Structured reconciliation list |
//! | POST   | `/admin/assets/{context}/confirm` | Keep committed uploads |
//! | GET/PUT | `/admin/pages/{page}` | Markdown pages |
//!
//! Mutating calls take a [`CsrfToken`] explicitly. There is no automatic
//! retry: a failed call is reported once and retried only by the caller.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use cif_core::{parse_filenames, AssetContext, AssetId, ContentType, PageKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;

pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Token read once from the upload page and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(Arc<str>);

impl CsrfToken {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CsrfToken([REDACTED])")
    }
}

fn csrf_input_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"<input[^>]*\bname="csrf_token"[^>]*\bvalue="([^"]+)""#).ok())
        .as_ref()
}

/// Pull the `csrf_token` hidden input value out of an HTML page.
pub fn scrape_csrf_token(html: &str) -> Option<CsrfToken> {
    csrf_input_pattern()?
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| CsrfToken::new(m.as_str()))
}

/// A file about to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// Declared MIME type sent with the multipart part.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, declaring its type from the extension.
    /// Unknown extensions are declared as `application/octet-stream`.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentType::from_extension)
            .map_or("application/octet-stream", |t| t.mime());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, content_type, bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessResult {
    pub identifier: AssetId,
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RevertResult {
    reverted: bool,
}

#[derive(Debug, Serialize)]
struct RevertBody<'a> {
    identifier: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentFiles {
    filenames: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentList {
    identifiers: Vec<AssetId>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfirmResult {
    confirmed: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageText {
    pub page: PageKind,
    pub md_text: String,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveResult {
    pub page: PageKind,
    pub changed: bool,
    pub revision: u64,
}

#[derive(Debug, Serialize)]
struct SaveBody<'a> {
    md_text: &'a str,
}

/// Client for one upload context.
#[derive(Debug, Clone)]
pub struct AssetClient {
    http: reqwest::Client,
    base_url: url::Url,
    context: AssetContext,
}

impl AssetClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.admin_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                    .map_err(|_| ClientError::Config(ConfigError::InvalidToken))?,
            );
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::transport("client_init", e))?;

        Ok(Self {
            http,
            base_url: config.base_url,
            context: config.context,
        })
    }

    pub fn context(&self) -> &AssetContext {
        &self.context
    }

    fn assets_url(&self, suffix: &str) -> String {
        format!("{}admin/assets/{}{}", self.base_url, self.context, suffix)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ClientError::transport(endpoint, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(endpoint, status, "request failed");
            return Err(ClientError::from_status(endpoint, status, body));
        }
        Ok(resp)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        self.send(endpoint, request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::decode(endpoint, e))
    }

    /// Read the CSRF token from the upload page.
    ///
    /// Calls `GET /admin/assets/{context}`.
    pub async fn fetch_csrf_token(&self) -> Result<CsrfToken, ClientError> {
        let endpoint = "GET /admin/assets/{context}";
        let html = self
            .send(endpoint, self.http.get(self.assets_url("")))
            .await?
            .text()
            .await
            .map_err(|e| ClientError::decode(endpoint, e))?;

        scrape_csrf_token(&html).ok_or_else(|| ClientError::Auth {
            endpoint: endpoint.into(),
            status: 200,
            message: "upload page carries no csrf_token input".into(),
        })
    }

    /// Upload one file.
    ///
    /// Calls `POST /admin/assets/{context}/process`.
    pub async fn process(
        &self,
        token: &CsrfToken,
        file: UploadFile,
    ) -> Result<ProcessResult, ClientError> {
        let endpoint = "POST /process";
        let size = file.bytes.len();
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|_| ClientError::Validation {
                endpoint: endpoint.into(),
                message: format!("invalid content type {:?}", file.content_type),
            })?;
        let form = reqwest::multipart::Form::new().part("filepond", part);

        let result: ProcessResult = self
            .send_json(
                endpoint,
                self.http
                    .post(self.assets_url("/process"))
                    .header(CSRF_HEADER, token.as_str())
                    .multipart(form),
            )
            .await?;
        tracing::debug!(
            file_name = %file.file_name,
            size_bytes = size,
            identifier = %result.identifier,
            deduplicated = result.deduplicated,
            "uploaded"
        );
        Ok(result)
    }

    /// Remove an uploaded asset. `Ok(false)` when it was already absent.
    ///
    /// Calls `DELETE /admin/assets/{context}/revert`.
    pub async fn revert(&self, token: &CsrfToken, identifier: &AssetId) -> Result<bool, ClientError> {
        let endpoint = "DELETE /revert";
        let result: RevertResult = self
            .send_json(
                endpoint,
                self.http
                    .delete(self.assets_url("/revert"))
                    .header(CSRF_HEADER, token.as_str())
                    .json(&RevertBody {
                        identifier: identifier.as_str(),
                    }),
            )
            .await?;
        Ok(result.reverted)
    }

    /// Fetch the bytes of an asset.
    ///
    /// Calls `GET /admin/assets/{context}/load/{identifier}`.
    pub async fn load(&self, identifier: &AssetId) -> Result<LoadedAsset, ClientError> {
        let endpoint = format!("GET /load/{identifier}");
        let resp = self
            .send(&endpoint, self.http.get(self.assets_url(&format!("/load/{identifier}"))))
            .await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::decode(&endpoint, e))?;
        Ok(LoadedAsset {
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    /// Committed identifiers via the legacy pipe-delimited list.
    ///
    /// Calls `GET /admin/assets/{context}/current-files`.
    pub async fn current_files(&self) -> Result<Vec<AssetId>, ClientError> {
        let endpoint = "GET /current-files";
        let body: CurrentFiles = self
            .send_json(endpoint, self.http.get(self.assets_url("/current-files")))
            .await?;
        parse_filenames(&body.filenames)
            .iter()
            .map(|name| AssetId::parse(name).map_err(|e| ClientError::decode(endpoint, e)))
            .collect()
    }

    /// Committed identifiers in commit order.
    ///
    /// Calls `GET /admin/assets/{context}/current`.
    pub async fn list_current(&self) -> Result<Vec<AssetId>, ClientError> {
        let body: CurrentList = self
            .send_json("GET /current", self.http.get(self.assets_url("/current")))
            .await?;
        Ok(body.identifiers)
    }

    /// Confirm every committed upload of the context.
    ///
    /// Calls `POST /admin/assets/{context}/confirm`.
    pub async fn confirm(&self, token: &CsrfToken) -> Result<usize, ClientError> {
        let body: ConfirmResult = self
            .send_json(
                "POST /confirm",
                self.http
                    .post(self.assets_url("/confirm"))
                    .header(CSRF_HEADER, token.as_str()),
            )
            .await?;
        Ok(body.confirmed)
    }

    /// Calls `GET /admin/pages/{page}`.
    pub async fn get_page(&self, page: PageKind) -> Result<PageText, ClientError> {
        let url = format!("{}admin/pages/{page}", self.base_url);
        self.send_json(&format!("GET /admin/pages/{page}"), self.http.get(url))
            .await
    }

    /// Calls `PUT /admin/pages/{page}`.
    pub async fn save_page(
        &self,
        token: &CsrfToken,
        page: PageKind,
        md_text: &str,
    ) -> Result<SaveResult, ClientError> {
        let url = format!("{}admin/pages/{page}", self.base_url);
        self.send_json(
            &format!("PUT /admin/pages/{page}"),
            self.http
                .put(url)
                .header(CSRF_HEADER, token.as_str())
                .json(&SaveBody { md_text }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_hidden_input() {
        let html = r#"<form><input type="hidden" name="csrf_token" value="123.abc.def"></form>"#;
        assert_eq!(scrape_csrf_token(html).unwrap().as_str(), "123.abc.def");
    }

    #[test]
    fn scrape_ignores_other_inputs() {
        let html = r#"<input name="other" value="x"><input type="file" name="filepond">"#;
        assert!(scrape_csrf_token(html).is_none());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = CsrfToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }

    #[tokio::test]
    async fn upload_file_infers_type_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("photo.PNG");
        tokio::fs::write(&png, b"png").await.unwrap();
        let txt = dir.path().join("notes.txt");
        tokio::fs::write(&txt, b"txt").await.unwrap();

        let file = UploadFile::from_path(&png).await.unwrap();
        assert_eq!(file.file_name, "photo.PNG");
        assert_eq!(file.content_type, "image/png");
        let file = UploadFile::from_path(&txt).await.unwrap();
        assert_eq!(file.content_type, "application/octet-stream");
    }
}
