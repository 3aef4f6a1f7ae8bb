//! Bounded local mirror cache for remote files.
//!
//! Remote files map deterministically to hash-named files in a flat
//! cache root. There is no manifest: size and age derive entirely from
//! filesystem metadata, so in-memory state is bootstrapped by a single
//! lazy scan of the root. Eviction is LRU-by-mtime with hysteresis:
//! when used bytes exceed the budget, the oldest entries are deleted
//! until usage drops to half the budget, so bursts do not thrash.
//!
//! Remote reachability is injected behind the `RemoteStore` trait; the
//! cache itself never speaks a network protocol.

use crate::error::{VfsError, VfsResult};
use crate::file_ref::FileRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default cache budget.
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Cache location and budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_bytes: u64,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheConfig {
            root: root.into(),
            max_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }
}

/// Access to files that are not reachable via the local filesystem.
/// Implementations wrap whatever protocol the application speaks.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Modification time of the remote file.
    async fn modification_time(&self, uri: &str) -> VfsResult<SystemTime>;
    /// Copy the remote file to `local`, replacing it. Returns the
    /// number of bytes written.
    async fn fetch(&self, uri: &str, local: &Path) -> VfsResult<u64>;
    /// Copy `local` back over the remote file.
    async fn store(&self, uri: &str, local: &Path) -> VfsResult<()>;
}

/// One tracked cache file.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Whether the lazy root scan has happened.
    loaded: bool,
    /// Oldest mtime first.
    entries: Vec<CacheEntry>,
    used_bytes: u64,
}

/// Bounded mirror cache. Shared via `Arc`; internal state is owned by
/// one mutex so multi-task use keeps the single-mutator discipline.
pub struct CacheStore {
    config: CacheConfig,
    remote: Arc<dyn RemoteStore>,
    state: Mutex<CacheState>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, remote: Arc<dyn RemoteStore>) -> Self {
        CacheStore {
            config,
            remote,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The local path backing `file`: native files map to themselves,
    /// remote files to a flat hash-named path under the cache root.
    pub fn cache_file_for(&self, file: &FileRef) -> PathBuf {
        match file {
            FileRef::Local(path) => path.clone(),
            FileRef::Remote(uri) => {
                let mut hasher = Sha256::new();
                hasher.update(uri.as_bytes());
                let digest = hasher.finalize();
                let mut name = String::with_capacity(64);
                for byte in digest {
                    name.push_str(&format!("{byte:02x}"));
                }
                self.config.root.join(name)
            }
        }
    }

    /// Track a newly written cache file.
    pub async fn record(&self, path: &Path, size: u64) {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.entries.iter().position(|e| e.path == path) {
            let old = state.entries.remove(pos);
            state.used_bytes -= old.size;
        }
        state.entries.push(CacheEntry {
            path: path.to_path_buf(),
            size,
            modified: SystemTime::now(),
        });
        state.used_bytes += size;
    }

    pub async fn used_bytes(&self) -> u64 {
        self.state.lock().await.used_bytes
    }

    /// Enforce the byte budget, lazily scanning the cache root on the
    /// first call. When usage exceeds the budget, the oldest-by-mtime
    /// entries are deleted until usage is at most half the budget. A
    /// failed on-disk delete still removes the entry from tracking.
    /// Returns the resulting used-byte count.
    pub async fn ensure_budget(&self) -> VfsResult<u64> {
        let mut state = self.state.lock().await;

        if !state.loaded {
            self.scan_root(&mut state).await?;
        }

        if state.used_bytes > self.config.max_bytes {
            let target = self.config.max_bytes / 2;
            let mut evicted = 0usize;
            while state.used_bytes > target && !state.entries.is_empty() {
                let entry = state.entries.remove(0);
                if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                    warn!(path = %entry.path.display(), error = %e,
                          "cache eviction delete failed, untracking anyway");
                }
                state.used_bytes -= entry.size;
                evicted += 1;
            }
            info!(
                evicted,
                used_bytes = state.used_bytes,
                "cache evicted to budget"
            );
        }

        Ok(state.used_bytes)
    }

    /// Return a local path whose content matches `file`. Native files
    /// map to themselves; remote files are fetched into the cache when
    /// the mirror is missing or older than the remote. Cancellation is
    /// observed around the remote round-trips; a fetch completed just
    /// as the token fired is removed again.
    pub async fn obtain_local(
        &self,
        file: &FileRef,
        cancel: &CancellationToken,
    ) -> VfsResult<PathBuf> {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        let FileRef::Remote(uri) = file else {
            return Ok(self.cache_file_for(file));
        };

        let cache_file = self.cache_file_for(file);
        let remote_mtime = self.remote.modification_time(uri).await?;

        if !is_up_to_date(&cache_file, remote_mtime).await {
            if cancel.is_cancelled() {
                return Err(VfsError::Cancelled);
            }
            tokio::fs::create_dir_all(&self.config.root)
                .await
                .map_err(|e| VfsError::from_io(e, &self.config.root))?;
            debug!(uri, cache = %cache_file.display(), "fetching remote into cache");
            let size = self.remote.fetch(uri, &cache_file).await?;
            if cancel.is_cancelled() {
                let _ = tokio::fs::remove_file(&cache_file).await;
                return Err(VfsError::Cancelled);
            }
            self.record(&cache_file, size).await;
            self.ensure_budget().await?;
        }

        Ok(cache_file)
    }

    /// Push the cache mirror back to the remote when it is newer.
    /// Returns whether a store happened. Cancellation is observed
    /// before each remote round-trip.
    pub async fn update_from_cache(
        &self,
        file: &FileRef,
        cancel: &CancellationToken,
    ) -> VfsResult<bool> {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        let FileRef::Remote(uri) = file else {
            return Ok(false);
        };

        let cache_file = self.cache_file_for(file);
        let Some(cache_mtime) = mtime_of(&cache_file).await else {
            return Ok(false);
        };
        let remote_mtime = self.remote.modification_time(uri).await?;

        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        if cache_mtime > remote_mtime {
            debug!(uri, cache = %cache_file.display(), "pushing cache copy to remote");
            self.remote.store(uri, &cache_file).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Delete every cache file and reset tracking.
    pub async fn clear(&self) -> VfsResult<()> {
        let mut state = self.state.lock().await;

        let mut entries = match tokio::fs::read_dir(&self.config.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.entries.clear();
                state.used_bytes = 0;
                state.loaded = true;
                return Ok(());
            }
            Err(e) => return Err(VfsError::from_io(e, &self.config.root)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, &self.config.root))?
        {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!(path = %entry.path().display(), error = %e, "cache clear delete failed");
            }
        }

        state.entries.clear();
        state.used_bytes = 0;
        state.loaded = true;
        Ok(())
    }

    /// Populate tracking from the flat cache root, oldest mtime first.
    async fn scan_root(&self, state: &mut CacheState) -> VfsResult<()> {
        state.entries.clear();
        state.used_bytes = 0;
        state.loaded = true;

        let mut dir = match tokio::fs::read_dir(&self.config.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(VfsError::from_io(e, &self.config.root)),
        };

        let mut found: Vec<CacheEntry> = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, &self.config.root))?
        {
            let path = entry.path();
            let Ok(meta) = tokio::fs::symlink_metadata(&path).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            found.push(CacheEntry {
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            });
        }

        found.sort_by_key(|e| e.modified);
        state.used_bytes = found.iter().map(|e| e.size).sum();
        state.entries = found;
        debug!(
            entries = state.entries.len(),
            used_bytes = state.used_bytes,
            "cache root scanned"
        );
        Ok(())
    }
}

async fn mtime_of(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn is_up_to_date(cache_file: &Path, remote_mtime: SystemTime) -> bool {
    match mtime_of(cache_file).await {
        Some(cache_mtime) => cache_mtime >= remote_mtime,
        None => false,
    }
}
