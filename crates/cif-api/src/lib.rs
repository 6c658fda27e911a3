//! # cif-api — Admin Asset Upload Service
//!
//! Server side of the administrator media upload protocol: validated
//! uploads become server-named assets, can be reverted or loaded back,
//! and are reconciled against the client through the current-files list.
//!
//! ## API Surface
//!
//! | Prefix                       | Module               |
//! |------------------------------|----------------------|
//! | `/admin/assets/{context}/*`  | [`routes::assets`]   |
//! | `/admin/pages/{page}`        | [`routes::pages`]    |
//! | `/metrics`                   | [`middleware::metrics`] |
//! | `/openapi.json`              | [`openapi`]          |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → CsrfMiddleware → Handler
//! ```

pub mod auth;
pub mod backend;
pub mod csrf;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod pages;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod store;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let mut api = Router::new()
        .merge(routes::assets::router(state.config.max_content_length))
        .merge(routes::pages::router())
        .merge(openapi::router());
    if state.config.metrics_enabled {
        api = api.route("/metrics", get(middleware::metrics::metrics_handler));
    }

    // Layers run bottom-up: CSRF needs the identity set by auth.
    let api = api
        .layer(from_fn(csrf::csrf_middleware))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(state.csrf.clone()))
        .layer(axum::Extension(metrics))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — the asset index is hydrated before the router exists.
async fn readiness(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    format!("ready: {} assets ({})", state.assets().len(), state.assets().backend_name())
}
