//! # Middleware
//!
//! - `metrics` — atomic request/error counters and the `/metrics` endpoint.
//! - `tracing_layer` — `TraceLayer` for per-request spans.

pub mod metrics;
pub mod tracing_layer;
