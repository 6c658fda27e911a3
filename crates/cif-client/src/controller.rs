//! # Upload Lifecycle Controller
//!
//! Client-side view of one upload context, independent of any UI toolkit.
//!
//! - On boot it reads the CSRF token once and seeds a limbo entry for each
//!   identifier the server already holds.
//! - Each added file is uploaded on its own task; several uploads may be
//!   in flight at once and each resolves independently.
//! - Removing a committed entry reverts it. Removing an entry whose upload
//!   is still in flight defers the revert until the upload resolves, so an
//!   upload that commits after removal does not leave an orphan.
//! - Deduplicated uploads bind several entries to one server identifier.
//!   The asset is reverted only when the last entry holding it is removed;
//!   earlier removals detach locally.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cif_core::AssetId;
use cif_state::{EntryState, FileEntry, Rejection};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::assets::{AssetClient, CsrfToken, UploadFile};
use crate::error::ClientError;

/// Local handle of a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What `remove` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The server asset was reverted (or was already gone).
    Reverted,
    /// Upload still in flight; it is reverted once it commits.
    Deferred,
    /// Nothing was on the server; the entry was dropped locally.
    Discarded,
    /// Another entry still holds the same server asset; only the local
    /// entry was dropped.
    Detached,
    /// Already removed or a revert is in progress.
    Unchanged,
}

/// Difference between the local committed set and the server list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Server list, in commit order.
    pub server: Vec<AssetId>,
    /// On the server but not bound to any local entry.
    pub untracked: Vec<AssetId>,
    /// Bound locally but gone from the server.
    pub missing: Vec<AssetId>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.untracked.is_empty() && self.missing.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    client: AssetClient,
    token: CsrfToken,
    entries: Mutex<BTreeMap<EntryId, FileEntry>>,
    /// Bytes of entries that may still need uploading (pending, or failed
    /// with a retryable error).
    payloads: Mutex<HashMap<EntryId, UploadFile>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

/// Whether an entry other than `id` still holds `identifier`.
fn held_elsewhere(entries: &BTreeMap<EntryId, FileEntry>, id: EntryId, identifier: &AssetId) -> bool {
    entries.iter().any(|(other, entry)| {
        *other != id
            && !entry.removed
            && entry.state == EntryState::Committed
            && entry.identifier.as_ref() == Some(identifier)
    })
}

/// Drop a committed entry locally without touching the server.
fn detach(entry: &mut FileEntry) {
    if entry.begin_revert().is_ok() {
        let _ = entry.reverted();
    }
}

fn rejection(err: &ClientError) -> Rejection {
    Rejection {
        message: err.user_message(),
        retryable: err.is_retryable(),
    }
}

impl LifecycleController {
    /// Read the CSRF token and seed limbo entries from the legacy list.
    pub async fn boot(client: AssetClient) -> Result<Self, ClientError> {
        let token = client.fetch_csrf_token().await?;
        let current = client.current_files().await?;
        let controller = Self::with_token(client, token);
        {
            let mut entries = controller.inner.entries.lock();
            for identifier in current {
                entries.insert(controller.mint_id(), FileEntry::limbo(identifier));
            }
        }
        tracing::info!(
            context = %controller.inner.client.context(),
            limbo = controller.len(),
            "lifecycle controller ready"
        );
        Ok(controller)
    }

    /// Controller with no seeded entries.
    pub fn with_token(client: AssetClient, token: CsrfToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                token,
                entries: Mutex::new(BTreeMap::new()),
                payloads: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn mint_id(&self) -> EntryId {
        EntryId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn token(&self) -> &CsrfToken {
        &self.inner.token
    }

    pub fn client(&self) -> &AssetClient {
        &self.inner.client
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, in the order added.
    pub fn entries(&self) -> Vec<(EntryId, FileEntry)> {
        self.inner
            .entries
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.clone()))
            .collect()
    }

    pub fn entry(&self, id: EntryId) -> Option<FileEntry> {
        self.inner.entries.lock().get(&id).cloned()
    }

    /// Identifiers of entries the user still holds, in entry order.
    pub fn committed_identifiers(&self) -> Vec<AssetId> {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| !e.removed && e.state == EntryState::Committed)
            .filter_map(|e| e.identifier.clone())
            .collect()
    }

    /// Add a file and start uploading it.
    ///
    /// Files failing the local type/size check are rejected without a
    /// network call.
    pub fn add_file(&self, file: UploadFile) -> EntryId {
        let id = self.mint_id();
        let mut entry = FileEntry::fresh(file.file_name.clone());

        if let Err(err) = cif_core::validate_upload(Some(&file.content_type), file.bytes.len() as u64) {
            tracing::info!(entry = %id, file_name = %file.file_name, reason = %err, "file rejected locally");
            let _ = entry.begin_commit();
            let _ = entry.rejected(Rejection {
                message: err.to_string(),
                retryable: false,
            });
            self.inner.entries.lock().insert(id, entry);
            return id;
        }

        self.inner.entries.lock().insert(id, entry);
        self.inner.payloads.lock().insert(id, file);
        self.start_upload(id);
        id
    }

    /// Re-issue the upload of an entry that failed with a retryable error.
    pub fn retry(&self, id: EntryId) -> Result<(), cif_state::EntryError> {
        {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(&id) {
                Some(entry) if !entry.removed => entry.retry()?,
                _ => return Err(cif_state::EntryError::NotRetryable),
            }
        }
        self.start_upload(id);
        Ok(())
    }

    fn start_upload(&self, id: EntryId) {
        let Some(file) = self.inner.payloads.lock().get(&id).cloned() else {
            return;
        };
        {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(&id) {
                Some(entry) => {
                    if let Err(e) = entry.begin_commit() {
                        tracing::warn!(entry = %id, error = %e, "upload not started");
                        return;
                    }
                }
                None => return,
            }
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_upload(inner, id, file));
        self.inner.tasks.lock().push(handle);
    }

    /// Remove an entry, reverting its server asset when there is one.
    pub async fn remove(&self, id: EntryId) -> Result<RemoveOutcome, ClientError> {
        let identifier = {
            let mut entries = self.inner.entries.lock();
            let shared = match entries.get(&id) {
                Some(entry) => entry
                    .identifier
                    .as_ref()
                    .is_some_and(|identifier| held_elsewhere(&entries, id, identifier)),
                None => return Ok(RemoveOutcome::Unchanged),
            };
            let Some(entry) = entries.get_mut(&id) else {
                return Ok(RemoveOutcome::Unchanged);
            };
            if entry.removed && entry.state != EntryState::Committed {
                return Ok(RemoveOutcome::Unchanged);
            }
            entry.mark_removed();
            let state = entry.state;
            match state {
                EntryState::Committed if shared => {
                    detach(entry);
                    tracing::info!(entry = %id, "asset still held by another entry, detached locally");
                    return Ok(RemoveOutcome::Detached);
                }
                EntryState::Committed => {
                    if entry.begin_revert().is_err() {
                        return Ok(RemoveOutcome::Unchanged);
                    }
                    entry.identifier.clone()
                }
                EntryState::Committing => return Ok(RemoveOutcome::Deferred),
                EntryState::Pending | EntryState::Failed => {
                    self.inner.payloads.lock().remove(&id);
                    return Ok(RemoveOutcome::Discarded);
                }
                EntryState::Reverting | EntryState::Reverted => {
                    return Ok(RemoveOutcome::Unchanged)
                }
            }
        };

        match identifier {
            Some(identifier) => {
                finish_revert(&self.inner, id, &identifier).await?;
                Ok(RemoveOutcome::Reverted)
            }
            None => Ok(RemoveOutcome::Discarded),
        }
    }

    /// Wait for every upload (and deferred revert) started so far.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "upload task panicked");
                }
            }
        }
    }

    /// Compare the locally committed set with the server list.
    pub async fn reconcile(&self) -> Result<Reconciliation, ClientError> {
        let server = self.inner.client.current_files().await?;
        let local = self.committed_identifiers();

        let server_set: HashSet<&AssetId> = server.iter().collect();
        let local_set: HashSet<&AssetId> = local.iter().collect();
        let untracked = server
            .iter()
            .filter(|id| !local_set.contains(id))
            .cloned()
            .collect();
        let missing = local
            .iter()
            .filter(|id| !server_set.contains(id))
            .cloned()
            .collect();

        Ok(Reconciliation {
            server,
            untracked,
            missing,
        })
    }
}

async fn run_upload(inner: Arc<Inner>, id: EntryId, file: UploadFile) {
    let result = inner.client.process(&inner.token, file).await;

    let orphan = {
        let mut entries = inner.entries.lock();
        let shared = match &result {
            Ok(outcome) => held_elsewhere(&entries, id, &outcome.identifier),
            Err(_) => false,
        };
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        match result {
            Ok(outcome) => {
                inner.payloads.lock().remove(&id);
                if let Err(e) = entry.committed(outcome.identifier.clone()) {
                    tracing::warn!(entry = %id, error = %e, "stale upload result");
                    None
                } else if entry.needs_orphan_revert() && shared {
                    detach(entry);
                    tracing::info!(entry = %id, identifier = %outcome.identifier, "removed upload shares a held asset, detached locally");
                    None
                } else if entry.needs_orphan_revert() {
                    let _ = entry.begin_revert();
                    Some(outcome.identifier)
                } else {
                    None
                }
            }
            Err(err) => {
                tracing::info!(entry = %id, error = %err, "upload failed");
                let rejection = rejection(&err);
                if entry.removed || !rejection.retryable {
                    inner.payloads.lock().remove(&id);
                }
                if let Err(e) = entry.rejected(rejection) {
                    tracing::warn!(entry = %id, error = %e, "stale upload failure");
                }
                None
            }
        }
    };

    if let Some(identifier) = orphan {
        tracing::info!(entry = %id, identifier = %identifier, "reverting upload removed in flight");
        if let Err(e) = finish_revert(&inner, id, &identifier).await {
            tracing::warn!(entry = %id, identifier = %identifier, error = %e, "orphan revert failed");
        }
    }
}

/// Issue `revert` for an entry already moved to `Reverting`.
async fn finish_revert(inner: &Inner, id: EntryId, identifier: &AssetId) -> Result<(), ClientError> {
    let result = inner.client.revert(&inner.token, identifier).await;
    let mut entries = inner.entries.lock();
    let Some(entry) = entries.get_mut(&id) else {
        return result.map(|_| ());
    };
    match result {
        Ok(_) => {
            let _ = entry.reverted();
            Ok(())
        }
        // Gone on the server is what revert wanted.
        Err(ClientError::NotFound { .. }) => {
            let _ = entry.reverted();
            Ok(())
        }
        Err(err) => {
            let _ = entry.revert_failed(rejection(&err));
            Err(err)
        }
    }
}
