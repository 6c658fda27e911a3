//! # API Route Modules
//!
//! - `assets` — Upload protocol: process, revert, load, reconciliation
//!   and confirm, plus the upload page that carries the CSRF token.
//! - `pages` — Markdown content pages edited by administrators.

pub mod assets;
pub mod pages;
