//! # Page Store
//!
//! Markdown text of the editable participant-facing pages. Saves have
//! replace semantics: saving identical text is a no-op, so a form that is
//! submitted twice leaves one revision.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cif_core::{validate_page_text, PageKind, ValidationError};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub page: PageKind,
    pub md_text: String,
    /// Incremented on every change. 0 means never saved.
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PageRecord {
    fn empty(page: PageKind) -> Self {
        Self {
            page,
            md_text: String::new(),
            revision: 0,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub changed: bool,
    pub revision: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PageStore {
    pages: Arc<RwLock<HashMap<PageKind, PageRecord>>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: PageKind) -> PageRecord {
        self.pages
            .read()
            .get(&page)
            .cloned()
            .unwrap_or_else(|| PageRecord::empty(page))
    }

    pub fn save(&self, page: PageKind, md_text: &str) -> Result<SaveOutcome, ValidationError> {
        validate_page_text(md_text)?;
        let mut pages = self.pages.write();
        let record = pages.entry(page).or_insert_with(|| PageRecord::empty(page));
        if record.md_text == md_text {
            return Ok(SaveOutcome {
                changed: false,
                revision: record.revision,
            });
        }
        record.md_text = md_text.to_string();
        record.revision += 1;
        record.updated_at = Some(Utc::now());
        tracing::info!(page = %page, revision = record.revision, "page text saved");
        Ok(SaveOutcome {
            changed: true,
            revision: record.revision,
        })
    }
}
