//! # Request Metrics
//!
//! Lightweight request metrics using atomic counters, rendered as plain
//! text at `/metrics` together with store gauges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::state::AppState;

/// Shared metrics state.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return current request count.
    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Return current error count.
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Render counters plus store gauges in text exposition format.
    pub fn render(&self, assets: usize, open_sessions: usize) -> String {
        format!(
            "# TYPE cif_requests_total counter\n\
             cif_requests_total {}\n\
             # TYPE cif_errors_total counter\n\
             cif_errors_total {}\n\
             # TYPE cif_assets gauge\n\
             cif_assets {}\n\
             # TYPE cif_upload_sessions_open gauge\n\
             cif_upload_sessions_open {}\n",
            self.requests(),
            self.errors(),
            assets,
            open_sessions
        )
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if response.status().is_server_error() || response.status().is_client_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    response
}

/// GET /metrics
pub async fn metrics_handler(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(state.assets().len(), state.sessions.open_sessions()),
    )
}
