//! Integration tests for the bounded mirror cache.

use async_trait::async_trait;
use gallery_vfs::{CacheConfig, CacheStore, FileRef, RemoteStore, VfsError, VfsResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// In-memory remote backend: URI to (content, mtime).
#[derive(Default)]
struct FakeRemote {
    files: Mutex<HashMap<String, (Vec<u8>, SystemTime)>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl FakeRemote {
    async fn put(&self, uri: &str, content: &[u8], mtime: SystemTime) {
        self.files
            .lock()
            .await
            .insert(uri.to_string(), (content.to_vec(), mtime));
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn modification_time(&self, uri: &str) -> VfsResult<SystemTime> {
        self.files
            .lock()
            .await
            .get(uri)
            .map(|(_, mtime)| *mtime)
            .ok_or_else(|| VfsError::NotFound(PathBuf::from(uri)))
    }

    async fn fetch(&self, uri: &str, local: &Path) -> VfsResult<u64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().await;
        let (content, _) = files
            .get(uri)
            .ok_or_else(|| VfsError::NotFound(PathBuf::from(uri)))?;
        tokio::fs::write(local, content)
            .await
            .map_err(|e| VfsError::from_io(e, local))?;
        Ok(content.len() as u64)
    }

    async fn store(&self, uri: &str, local: &Path) -> VfsResult<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        let content = tokio::fs::read(local)
            .await
            .map_err(|e| VfsError::from_io(e, local))?;
        self.files
            .lock()
            .await
            .insert(uri.to_string(), (content, SystemTime::now()));
        Ok(())
    }
}

fn store_with(tmp: &TempDir, max_bytes: u64, remote: Arc<FakeRemote>) -> CacheStore {
    CacheStore::new(
        CacheConfig {
            root: tmp.path().join("cache"),
            max_bytes,
        },
        remote,
    )
}

/// Local files bypass the cache entirely: they map to themselves.
#[tokio::test]
async fn test_local_files_map_to_themselves() {
    let tmp = TempDir::new().unwrap();
    let cache = store_with(&tmp, 1000, Arc::new(FakeRemote::default()));

    let file = FileRef::local("/photos/pic.jpg");
    assert_eq!(cache.cache_file_for(&file), PathBuf::from("/photos/pic.jpg"));
    assert_eq!(
        cache.obtain_local(&file, &CancellationToken::new()).await.unwrap(),
        PathBuf::from("/photos/pic.jpg")
    );
}

/// The same remote URI always maps to the same cache file; different
/// URIs never collide.
#[tokio::test]
async fn test_remote_mapping_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let cache = store_with(&tmp, 1000, Arc::new(FakeRemote::default()));

    let a = cache.cache_file_for(&FileRef::remote("sftp://host/a.jpg"));
    let a2 = cache.cache_file_for(&FileRef::remote("sftp://host/a.jpg"));
    let b = cache.cache_file_for(&FileRef::remote("sftp://host/b.jpg"));

    assert_eq!(a, a2);
    assert_ne!(a, b);
    assert_eq!(a.parent().unwrap(), tmp.path().join("cache"));
}

/// First access fetches; a second access with an unchanged remote is
/// served from the mirror without another fetch.
#[tokio::test]
async fn test_obtain_local_fetches_once() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());
    let past = SystemTime::now() - Duration::from_secs(3600);
    remote.put("sftp://host/pic.jpg", b"image bytes", past).await;

    let cache = store_with(&tmp, 1_000_000, remote.clone());
    let file = FileRef::remote("sftp://host/pic.jpg");

    let local = cache.obtain_local(&file, &CancellationToken::new()).await.unwrap();
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"image bytes");
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 1);

    let again = cache.obtain_local(&file, &CancellationToken::new()).await.unwrap();
    assert_eq!(again, local);
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 1, "mirror is current, no refetch");
}

/// A remote newer than the mirror forces a refetch.
#[tokio::test]
async fn test_obtain_local_refreshes_stale_mirror() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());
    let past = SystemTime::now() - Duration::from_secs(3600);
    remote.put("sftp://host/pic.jpg", b"v1", past).await;

    let cache = store_with(&tmp, 1_000_000, remote.clone());
    let file = FileRef::remote("sftp://host/pic.jpg");
    cache.obtain_local(&file, &CancellationToken::new()).await.unwrap();

    // Remote changes after the first fetch.
    let future = SystemTime::now() + Duration::from_secs(3600);
    remote.put("sftp://host/pic.jpg", b"v2", future).await;

    let local = cache.obtain_local(&file, &CancellationToken::new()).await.unwrap();
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"v2");
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 2);
}

/// A mirror newer than the remote is pushed back; an up-to-date remote
/// is left alone.
#[tokio::test]
async fn test_update_from_cache_pushes_newer_mirror() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());
    let past = SystemTime::now() - Duration::from_secs(3600);
    remote.put("sftp://host/pic.jpg", b"v1", past).await;

    let cache = store_with(&tmp, 1_000_000, remote.clone());
    let file = FileRef::remote("sftp://host/pic.jpg");
    let local = cache.obtain_local(&file, &CancellationToken::new()).await.unwrap();

    // Edit the mirror; its mtime is now ahead of the remote's.
    tokio::fs::write(&local, b"edited").await.unwrap();

    assert!(cache.update_from_cache(&file, &CancellationToken::new()).await.unwrap());
    assert_eq!(remote.stores.load(Ordering::SeqCst), 1);
    assert_eq!(
        remote.files.lock().await.get("sftp://host/pic.jpg").unwrap().0,
        b"edited"
    );

    // Second push: the store above stamped the remote with now(), so
    // the mirror is no longer newer.
    assert!(!cache.update_from_cache(&file, &CancellationToken::new()).await.unwrap());
    assert_eq!(remote.stores.load(Ordering::SeqCst), 1);
}

/// Over-budget usage evicts oldest mirrors first, down to half the
/// budget.
#[tokio::test]
async fn test_eviction_drops_oldest_to_half_budget() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("cache");
    tokio::fs::create_dir_all(&root).await.unwrap();

    // Three 400-byte mirrors with strictly increasing mtimes.
    for name in ["first", "second", "third"] {
        tokio::fs::write(root.join(name), vec![0u8; 400]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    let cache = store_with(&tmp, 1000, Arc::new(FakeRemote::default()));
    let used = cache.ensure_budget().await.unwrap();

    // 1200 bytes exceeds 1000: evict to <= 500, oldest first.
    assert_eq!(used, 400);
    assert!(!root.join("first").exists());
    assert!(!root.join("second").exists());
    assert!(root.join("third").exists());
}

/// Under-budget usage evicts nothing.
#[tokio::test]
async fn test_no_eviction_under_budget() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("cache");
    tokio::fs::create_dir_all(&root).await.unwrap();
    tokio::fs::write(root.join("a"), vec![0u8; 400]).await.unwrap();
    tokio::fs::write(root.join("b"), vec![0u8; 400]).await.unwrap();

    let cache = store_with(&tmp, 1000, Arc::new(FakeRemote::default()));
    let used = cache.ensure_budget().await.unwrap();

    assert_eq!(used, 800);
    assert!(root.join("a").exists());
    assert!(root.join("b").exists());
}

/// A cancelled token short-circuits before any remote traffic: no
/// fetch, no store, no bytes moved.
#[tokio::test]
async fn test_cancellation_skips_remote_round_trips() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());
    let past = SystemTime::now() - Duration::from_secs(3600);
    remote.put("sftp://host/pic.jpg", b"image bytes", past).await;

    let cache = store_with(&tmp, 1_000_000, remote.clone());
    let file = FileRef::remote("sftp://host/pic.jpg");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = cache.obtain_local(&file, &cancel).await;
    assert!(matches!(result, Err(VfsError::Cancelled)));
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 0);
    assert!(!cache.cache_file_for(&file).exists(), "nothing mirrored");

    let result = cache.update_from_cache(&file, &cancel).await;
    assert!(matches!(result, Err(VfsError::Cancelled)));
    assert_eq!(remote.stores.load(Ordering::SeqCst), 0);
}

/// Clear removes every mirror and resets accounting.
#[tokio::test]
async fn test_clear_empties_cache() {
    let tmp = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());
    remote
        .put("sftp://host/pic.jpg", b"bytes", SystemTime::now() - Duration::from_secs(60))
        .await;

    let cache = store_with(&tmp, 1_000_000, remote.clone());
    let local = cache
        .obtain_local(&FileRef::remote("sftp://host/pic.jpg"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(local.exists());

    cache.clear().await.unwrap();
    assert!(!local.exists());
    assert_eq!(cache.used_bytes().await, 0);
}
