//! # Asset Store
//!
//! Maps asset identifiers to bytes and metadata. The bytes live in an
//! [`AssetBackend`]; this type keeps an in-memory index used for lookup,
//! per-context ordering and content-hash dedupe.
//!
//! ## Visibility
//!
//! An asset enters the index only after the backend write has completed,
//! and leaves the index before the backend delete starts. Readers of the
//! index (`list`, `read`) therefore never observe a partial commit.
//!
//! ## Ordering
//!
//! Data writes run concurrently. The sequence number is assigned when the
//! asset is published, under a publish lock that also covers the metadata
//! write, so `seq` order is the order in which commits completed, both in
//! memory and after hydration.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use cif_core::{AssetContext, AssetId, AssetMeta, ContentDigest};
use parking_lot::RwLock;
use thiserror::Error;

use crate::backend::AssetBackend;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("asset {0} not found")]
    NotFound(AssetId),

    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt asset metadata at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
struct AssetIndex {
    by_id: HashMap<AssetId, AssetMeta>,
    /// Commit order per context, keyed by sequence number.
    by_context: HashMap<AssetContext, BTreeMap<u64, AssetId>>,
    by_digest: HashMap<(AssetContext, ContentDigest), AssetId>,
}

impl AssetIndex {
    fn insert(&mut self, meta: AssetMeta) {
        self.by_context
            .entry(meta.context.clone())
            .or_default()
            .insert(meta.seq, meta.identifier.clone());
        self.by_digest.insert(
            (meta.context.clone(), meta.digest.clone()),
            meta.identifier.clone(),
        );
        self.by_id.insert(meta.identifier.clone(), meta);
    }

    fn remove(&mut self, id: &AssetId) -> Option<AssetMeta> {
        let meta = self.by_id.remove(id)?;
        if let Some(ordered) = self.by_context.get_mut(&meta.context) {
            ordered.remove(&meta.seq);
            if ordered.is_empty() {
                self.by_context.remove(&meta.context);
            }
        }
        self.by_digest
            .remove(&(meta.context.clone(), meta.digest.clone()));
        Some(meta)
    }
}

/// Cloneable handle to the asset store.
#[derive(Debug, Clone)]
pub struct AssetStore {
    backend: Arc<dyn AssetBackend>,
    index: Arc<RwLock<AssetIndex>>,
    next_seq: Arc<AtomicU64>,
    publish: Arc<tokio::sync::Mutex<()>>,
}

impl AssetStore {
    /// Open a store over `backend`, hydrating the index from what the
    /// backend already holds. Sequence numbers resume after the highest
    /// one seen.
    pub fn open(backend: Arc<dyn AssetBackend>) -> Result<Self, StoreError> {
        let mut existing = backend.scan()?;
        existing.sort_by_key(|m| m.seq);
        let next = existing.last().map(|m| m.seq + 1).unwrap_or(1);
        let count = existing.len();

        let mut index = AssetIndex::default();
        for meta in existing {
            index.insert(meta);
        }

        tracing::info!(backend = backend.name(), assets = count, "asset store hydrated");

        Ok(Self {
            backend,
            index: Arc::new(RwLock::new(index)),
            next_seq: Arc::new(AtomicU64::new(next)),
            publish: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Persist an asset and publish it in the index.
    ///
    /// The incoming `seq` is ignored; the returned metadata carries the
    /// sequence number assigned at publish time.
    pub async fn commit(&self, mut meta: AssetMeta, bytes: Bytes) -> Result<AssetMeta, StoreError> {
        let backend = Arc::clone(&self.backend);
        let staged = meta.clone();
        tokio::task::spawn_blocking(move || backend.put_data(&staged, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        let _publish = self.publish.lock().await;
        meta.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let backend = Arc::clone(&self.backend);
        let marker = meta.clone();
        let written = tokio::task::spawn_blocking(move || backend.put_meta(&marker))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = written {
            let backend = Arc::clone(&self.backend);
            let target = meta.clone();
            if let Ok(Err(cleanup)) = tokio::task::spawn_blocking(move || backend.remove(&target)).await {
                tracing::warn!(identifier = %meta.identifier, error = %cleanup, "could not remove uncommitted data");
            }
            return Err(e);
        }

        self.index.write().insert(meta.clone());
        Ok(meta)
    }

    /// Metadata for a committed identifier.
    pub fn get(&self, id: &AssetId) -> Option<AssetMeta> {
        self.index.read().by_id.get(id).cloned()
    }

    /// Bytes and metadata of a committed identifier.
    pub async fn read(&self, id: &AssetId) -> Result<(AssetMeta, Bytes), StoreError> {
        let meta = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let backend = Arc::clone(&self.backend);
        let lookup = meta.clone();
        let bytes = tokio::task::spawn_blocking(move || backend.get(&lookup))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        match bytes {
            Some(bytes) => Ok((meta, bytes)),
            // Reverted between the index lookup and the read.
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    /// Delete an asset that belongs to `context`.
    ///
    /// An identifier from another context is reported as not found.
    pub async fn delete(&self, context: &AssetContext, id: &AssetId) -> Result<AssetMeta, StoreError> {
        let meta = {
            let mut index = self.index.write();
            match index.by_id.get(id) {
                Some(meta) if &meta.context == context => {}
                _ => return Err(StoreError::NotFound(id.clone())),
            }
            index
                .remove(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?
        };

        let backend = Arc::clone(&self.backend);
        let target = meta.clone();
        let removed = tokio::task::spawn_blocking(move || backend.remove(&target))
            .await
            .map_err(|e| StoreError::Task(e.to_string()));

        match removed {
            Ok(Ok(_)) => Ok(meta),
            Ok(Err(e)) | Err(e) => {
                // The bytes are still there; keep the asset visible.
                self.index.write().insert(meta);
                Err(e)
            }
        }
    }

    /// Committed identifiers of a context, in commit order.
    pub fn list(&self, context: &AssetContext) -> Vec<AssetId> {
        self.index
            .read()
            .by_context
            .get(context)
            .map(|ordered| ordered.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed asset in `context` with the given content digest.
    pub fn find_by_digest(&self, context: &AssetContext, digest: &ContentDigest) -> Option<AssetMeta> {
        let index = self.index.read();
        index
            .by_digest
            .get(&(context.clone(), digest.clone()))
            .and_then(|id| index.by_id.get(id))
            .cloned()
    }

    /// Total number of committed assets.
    pub fn len(&self) -> usize {
        self.index.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
