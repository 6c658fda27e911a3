//! # Asset Backends
//!
//! Byte storage behind the [`AssetStore`](crate::store::AssetStore).
//! Backends are synchronous; the store calls them from
//! `tokio::task::spawn_blocking`.
//!
//! - [`MemoryBackend`]: `DashMap`, used when no upload directory is
//!   configured and in tests.
//! - [`FsBackend`]: one directory per context holding `{identifier}` and
//!   `{identifier}.json`.
//!
//! ## Atomicity
//!
//! A commit is two steps: `put_data` writes the bytes, then `put_meta`
//! writes the metadata, each through a temp file and `rename`. The metadata
//! file is the commit marker: `scan` ignores data files without one, so a
//! crash mid-write never surfaces a partial asset.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use cif_core::{AssetContext, AssetId, AssetMeta};
use dashmap::DashMap;

use crate::store::StoreError;

/// Durable byte storage for committed assets.
pub trait AssetBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Persist the bytes of an asset. Not visible to `scan` until
    /// `put_meta` runs for the same identifier.
    fn put_data(&self, meta: &AssetMeta, bytes: &Bytes) -> Result<(), StoreError>;

    /// Persist metadata, marking the asset committed.
    fn put_meta(&self, meta: &AssetMeta) -> Result<(), StoreError>;

    /// Both steps of a commit.
    fn put(&self, meta: &AssetMeta, bytes: &Bytes) -> Result<(), StoreError> {
        self.put_data(meta, bytes)?;
        self.put_meta(meta)
    }

    fn get(&self, meta: &AssetMeta) -> Result<Option<Bytes>, StoreError>;

    /// Delete an asset. Returns `false` if it was already absent.
    fn remove(&self, meta: &AssetMeta) -> Result<bool, StoreError>;

    /// Metadata of every committed asset, in no particular order.
    fn scan(&self) -> Result<Vec<AssetMeta>, StoreError>;
}

// ── Memory ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct StoredObject {
    meta: AssetMeta,
    bytes: Bytes,
    committed: bool,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<AssetId, StoredObject>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put_data(&self, meta: &AssetMeta, bytes: &Bytes) -> Result<(), StoreError> {
        self.objects.insert(
            meta.identifier.clone(),
            StoredObject {
                meta: meta.clone(),
                bytes: bytes.clone(),
                committed: false,
            },
        );
        Ok(())
    }

    fn put_meta(&self, meta: &AssetMeta) -> Result<(), StoreError> {
        match self.objects.get_mut(&meta.identifier) {
            Some(mut object) => {
                object.meta = meta.clone();
                object.committed = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(meta.identifier.clone())),
        }
    }

    fn get(&self, meta: &AssetMeta) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .objects
            .get(&meta.identifier)
            .map(|entry| entry.value().bytes.clone()))
    }

    fn remove(&self, meta: &AssetMeta) -> Result<bool, StoreError> {
        Ok(self.objects.remove(&meta.identifier).is_some())
    }

    fn scan(&self) -> Result<Vec<AssetMeta>, StoreError> {
        Ok(self
            .objects
            .iter()
            .filter(|e| e.value().committed)
            .map(|e| e.value().meta.clone())
            .collect())
    }
}

// ── Filesystem ──────────────────────────────────────────────────────

const META_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open (and create if needed) the upload directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io("create upload dir", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn context_dir(&self, context: &AssetContext) -> PathBuf {
        self.root.join(context.as_str())
    }

    fn data_path(&self, meta: &AssetMeta) -> PathBuf {
        self.context_dir(&meta.context).join(meta.identifier.as_str())
    }

    fn meta_path(&self, meta: &AssetMeta) -> PathBuf {
        self.context_dir(&meta.context)
            .join(format!("{}{META_SUFFIX}", meta.identifier))
    }
}

/// Write via a sibling temp file, fsync, then rename into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("asset");
    let tmp = path.with_file_name(format!(".{file_name}{TMP_SUFFIX}"));
    let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io("create temp file", &tmp, e))?;
    file.write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io("write temp file", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io("rename temp file", path, e)
    })
}

fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io("remove file", path, e)),
    }
}

impl AssetBackend for FsBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn put_data(&self, meta: &AssetMeta, bytes: &Bytes) -> Result<(), StoreError> {
        let dir = self.context_dir(&meta.context);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io("create context dir", &dir, e))?;
        write_atomic(&self.data_path(meta), bytes)
    }

    fn put_meta(&self, meta: &AssetMeta) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(meta).map_err(|e| StoreError::Corrupt {
            path: self.meta_path(meta),
            reason: e.to_string(),
        })?;
        write_atomic(&self.meta_path(meta), &json)
    }

    fn get(&self, meta: &AssetMeta) -> Result<Option<Bytes>, StoreError> {
        let path = self.data_path(meta);
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("read asset", &path, e)),
        }
    }

    fn remove(&self, meta: &AssetMeta) -> Result<bool, StoreError> {
        // Metadata first: once it is gone the asset no longer exists.
        let had_meta = remove_if_exists(&self.meta_path(meta))?;
        let had_data = remove_if_exists(&self.data_path(meta))?;
        Ok(had_meta || had_data)
    }

    fn scan(&self) -> Result<Vec<AssetMeta>, StoreError> {
        let mut found = Vec::new();
        let entries =
            fs::read_dir(&self.root).map_err(|e| StoreError::io("read upload dir", &self.root, e))?;
        for entry in entries.flatten() {
            let dir = entry.path();
            let Some(context) = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| AssetContext::parse(n).ok())
            else {
                continue;
            };
            if !dir.is_dir() {
                continue;
            }
            let files = fs::read_dir(&dir).map_err(|e| StoreError::io("read context dir", &dir, e))?;
            for file in files.flatten() {
                let path = file.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name.ends_with(TMP_SUFFIX) {
                    tracing::warn!(path = %path.display(), "removing stale temp file");
                    let _ = fs::remove_file(&path);
                    continue;
                }
                let Some(stem) = name.strip_suffix(META_SUFFIX) else {
                    continue;
                };
                if AssetId::parse(stem).is_err() {
                    continue;
                }
                match read_meta(&path) {
                    Ok(meta) if meta.context == context && meta.identifier.as_str() == stem => {
                        if dir.join(stem).is_file() {
                            found.push(meta);
                        } else {
                            tracing::warn!(identifier = stem, "metadata without data file, skipping");
                        }
                    }
                    Ok(_) => {
                        tracing::warn!(path = %path.display(), "metadata does not match its location, skipping");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable asset metadata, skipping");
                    }
                }
            }
        }
        Ok(found)
    }
}

fn read_meta(path: &Path) -> Result<AssetMeta, StoreError> {
    let raw = fs::read(path).map_err(|e| StoreError::io("read metadata", path, e))?;
    serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
