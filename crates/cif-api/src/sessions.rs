//! # Upload Session Manager
//!
//! The only writer of the [`AssetStore`]. Each `process` call opens an
//! [`UploadSession`] that moves `Staged → Committed` once the store has
//! persisted the bytes, or `Staged → Failed` on rejection. `revert` moves a
//! committed session to `Reverted`. Failed and reverted sessions are dropped
//! immediately; committed ones live until [`UploadSessionManager::confirm`].
//!
//! ## Concurrency
//!
//! Calls for the same `(context, digest)` are serialized through a per-key
//! async mutex, so identical concurrent uploads persist at most one asset.
//! Calls for different content proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use chrono::Utc;
use cif_core::{
    validate_upload_limited, AssetContext, AssetId, AssetMeta, ContentDigest, ValidationError,
};
use cif_state::{SessionError, UploadSession};
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::state::Store;
use crate::store::{AssetStore, StoreError};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A file received from the client, before validation.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub bytes: Bytes,
    pub declared_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub identifier: AssetId,
    /// Identical bytes were already committed in this context.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted,
    /// Nothing to delete. Reported to the client as success.
    AlreadyAbsent,
}

type DigestKey = (AssetContext, ContentDigest);

#[derive(Debug, Clone)]
pub struct UploadSessionManager {
    store: AssetStore,
    sessions: Store<UploadSession>,
    by_identifier: Arc<RwLock<HashMap<AssetId, Uuid>>>,
    digest_locks: Arc<DashMap<DigestKey, Arc<tokio::sync::Mutex<()>>>>,
    max_bytes: u64,
}

impl UploadSessionManager {
    pub fn new(store: AssetStore, max_bytes: u64) -> Self {
        Self {
            store,
            sessions: Store::new(),
            by_identifier: Arc::new(RwLock::new(HashMap::new())),
            digest_locks: Arc::new(DashMap::new()),
            max_bytes,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Sessions not yet confirmed or discarded.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, id: &Uuid) -> Option<UploadSession> {
        self.sessions.get(id)
    }

    /// Validate, dedupe and commit an uploaded file.
    pub async fn process(
        &self,
        context: &AssetContext,
        file: IncomingFile,
    ) -> Result<ProcessOutcome, UploadError> {
        let size = file.bytes.len() as u64;
        let digest = ContentDigest::of(&file.bytes);
        let mut session = UploadSession::staged(context.clone(), digest.clone());

        let content_type =
            match validate_upload_limited(file.declared_type.as_deref(), size, self.max_bytes) {
                Ok(ct) => ct,
                Err(e) => {
                    session.fail(&e.to_string())?;
                    tracing::warn!(
                        context = %context,
                        size_bytes = size,
                        reason = %e,
                        "upload rejected"
                    );
                    return Err(e.into());
                }
            };

        let key = (context.clone(), digest.clone());
        let lock = self.digest_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;

            if let Some(existing) = self.store.find_by_digest(context, &digest) {
                tracing::info!(
                    context = %context,
                    identifier = %existing.identifier,
                    "duplicate upload, returning existing identifier"
                );
                Ok(ProcessOutcome {
                    identifier: existing.identifier,
                    deduplicated: true,
                })
            } else {
                self.commit_new(session, content_type, file, size).await
            }
        };
        drop(lock);
        self.release_digest_lock(&key);
        outcome
    }

    async fn commit_new(
        &self,
        session: UploadSession,
        content_type: cif_core::ContentType,
        file: IncomingFile,
        size: u64,
    ) -> Result<ProcessOutcome, UploadError> {
        let session_id = session.session_id;
        let context = session.context.clone();
        let meta = AssetMeta {
            identifier: AssetId::mint(content_type),
            context: context.clone(),
            content_type,
            size_bytes: size,
            digest: session.digest.clone(),
            original_name: file.file_name,
            created_at: Utc::now(),
            // Assigned by the store when the commit is published.
            seq: 0,
        };
        self.sessions.insert(session_id, session);

        match self.store.commit(meta, file.bytes).await {
            Ok(meta) => {
                let identifier = meta.identifier.clone();
                self.sessions
                    .try_update(&session_id, |s| s.commit(identifier.clone()))
                    .transpose()?;
                self.by_identifier
                    .write()
                    .insert(identifier.clone(), session_id);
                tracing::info!(
                    context = %context,
                    identifier = %identifier,
                    size_bytes = size,
                    "asset committed"
                );
                Ok(ProcessOutcome {
                    identifier,
                    deduplicated: false,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                let _ = self.sessions.try_update(&session_id, |s| s.fail(&reason));
                self.sessions.remove(&session_id);
                Err(e.into())
            }
        }
    }

    /// Delete an asset of `context`. Idempotent: an unknown identifier, or
    /// one from another context, is [`RevertOutcome::AlreadyAbsent`].
    pub async fn revert(
        &self,
        context: &AssetContext,
        identifier: &AssetId,
    ) -> Result<RevertOutcome, UploadError> {
        let Some(meta) = self.store.get(identifier).filter(|m| &m.context == context) else {
            tracing::debug!(context = %context, identifier = %identifier, "revert of absent asset");
            return Ok(RevertOutcome::AlreadyAbsent);
        };

        let key = (context.clone(), meta.digest.clone());
        let lock = self.digest_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.store.delete(context, identifier).await
        };
        drop(lock);
        self.release_digest_lock(&key);

        match result {
            Ok(_) => {
                let session_id = self.by_identifier.write().remove(identifier);
                if let Some(session_id) = session_id {
                    if let Some(Err(e)) = self.sessions.try_update(&session_id, |s| s.revert()) {
                        tracing::warn!(error = %e, "session out of step with store on revert");
                    }
                    self.sessions.remove(&session_id);
                }
                tracing::info!(context = %context, identifier = %identifier, "asset reverted");
                Ok(RevertOutcome::Reverted)
            }
            Err(StoreError::NotFound(_)) => Ok(RevertOutcome::AlreadyAbsent),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes of a committed asset in `context`.
    pub async fn load(
        &self,
        context: &AssetContext,
        identifier: &AssetId,
    ) -> Result<(AssetMeta, Bytes), StoreError> {
        let (meta, bytes) = self.store.read(identifier).await?;
        if &meta.context != context {
            return Err(StoreError::NotFound(identifier.clone()));
        }
        Ok((meta, bytes))
    }

    /// Committed identifiers of `context`, in commit order.
    pub fn list_current(&self, context: &AssetContext) -> Vec<AssetId> {
        self.store.list(context)
    }

    /// Confirm and drop every committed session of `context`.
    pub fn confirm(&self, context: &AssetContext) -> usize {
        let ids: Vec<Uuid> = self
            .sessions
            .list()
            .into_iter()
            .filter(|s| &s.context == context)
            .map(|s| s.session_id)
            .collect();

        let mut confirmed = 0;
        for id in ids {
            if let Some(Ok(())) = self.sessions.try_update(&id, |s| s.confirm()) {
                if let Some(session) = self.sessions.remove(&id) {
                    if let Some(identifier) = session.content_ref {
                        self.by_identifier.write().remove(&identifier);
                    }
                    confirmed += 1;
                }
            }
        }
        tracing::info!(context = %context, confirmed, "upload sessions confirmed");
        confirmed
    }

    fn digest_lock(&self, key: &DigestKey) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.digest_locks.entry(key.clone()).or_default().value())
    }

    fn release_digest_lock(&self, key: &DigestKey) {
        self.digest_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
