//! Graph cache repository with single-flight builds

use std::future::Future;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::{CacheError, GraphError};
use crate::graph::GenericGraph;
use crate::model::{CacheEntry, CacheFilter, CacheKey, SourceMetadata};

/// Cache directory: .schemascope/
pub const CACHE_DIR: &str = ".schemascope";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Storage backend for cache entries.
///
/// `put` and `remove` must be atomic with respect to `get`: a reader sees
/// either the previous entry or the new one.
pub trait GraphStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, CacheError>;
    fn put(&self, entry: Arc<CacheEntry>) -> Result<(), CacheError>;
    /// Remove matching entries, returning how many were removed.
    fn remove(&self, filter: &CacheFilter) -> Result<usize, CacheError>;
    fn keys(&self) -> Result<Vec<CacheKey>, CacheError>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        Ok(self.entries.get(key).map(|r| Arc::clone(r.value())))
    }

    fn put(&self, entry: Arc<CacheEntry>) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&self, filter: &CacheFilter) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !filter.matches(key));
        Ok(before - self.entries.len())
    }

    fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        Ok(self.entries.iter().map(|r| r.key().clone()).collect())
    }
}

/// One JSON file per key under `<root>/.schemascope/`. Survives restarts.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: cache_dir(root),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))
    }

    fn read_entry(&self, path: &Path) -> Result<CacheEntry, CacheError> {
        let json_str = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        serde_json::from_str(&json_str).map_err(|e| CacheError::Corrupt {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl GraphStore for DiskStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let entry = self.read_entry(&path)?;
        if entry.key != *key {
            tracing::warn!(
                "Cache file {} holds {}, not {}; treating as a miss",
                path.display(),
                entry.key,
                key
            );
            return Ok(None);
        }
        tracing::debug!("Graph cache loaded from: {}", path.display());
        Ok(Some(Arc::new(entry)))
    }

    fn put(&self, entry: Arc<CacheEntry>) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let path = self.entry_path(&entry.key);
        let json_str = serde_json::to_string(entry.as_ref()).map_err(|e| CacheError::Corrupt {
            key: entry.key.to_string(),
            message: e.to_string(),
        })?;

        // Write beside the target and rename so readers never see a partial file.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        tmp.write_all(json_str.as_bytes())
            .map_err(|e| io_error(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| io_error(&path, e.error))?;

        tracing::debug!("Graph cache saved: {}", path.display());
        Ok(())
    }

    fn remove(&self, filter: &CacheFilter) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let matches = match self.read_entry(&path) {
                Ok(entry) => filter.matches(&entry.key),
                // Unreadable files are only swept by a full clear.
                Err(_) => filter.is_all(),
            };
            if matches {
                std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        let mut keys = Vec::new();
        for path in self.entry_files()? {
            match self.read_entry(&path) {
                Ok(entry) => keys.push(entry.key),
                Err(e) => tracing::warn!("Skipping unreadable cache file: {}", e),
            }
        }
        Ok(keys)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

type SharedBuild = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, GraphError>>>;

/// A running build and the id of the task driving it.
#[derive(Clone)]
struct Inflight {
    id: u64,
    result: SharedBuild,
}

/// Stores, retrieves and invalidates generic graphs by (source, mode, scope).
///
/// Constructed explicitly and shared through `Arc`; there is no global
/// instance. At most one build runs per key: concurrent callers of
/// [`GraphCacheRepository::build_once`] for the same key await the leader's
/// result.
pub struct GraphCacheRepository {
    store: Arc<dyn GraphStore>,
    inflight: Arc<DashMap<CacheKey, Inflight>>,
    next_build: AtomicU64,
}

impl GraphCacheRepository {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            inflight: Arc::new(DashMap::new()),
            next_build: AtomicU64::new(1),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn on_disk(root: &Path) -> Self {
        Self::new(Arc::new(DiskStore::new(root)))
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let entry = self.store.get(key)?;
        if entry.is_some() {
            tracing::debug!("Cache HIT for {}", key);
        } else {
            tracing::debug!("Cache MISS for {}", key);
        }
        Ok(entry)
    }

    pub fn put(
        &self,
        key: CacheKey,
        graph: GenericGraph,
        metadata: SourceMetadata,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        let entry = Arc::new(CacheEntry::new(key, graph, metadata));
        self.store.put(Arc::clone(&entry))?;
        Ok(entry)
    }

    pub fn clear(&self, filter: &CacheFilter) -> Result<usize, CacheError> {
        let removed = self.store.remove(filter)?;
        tracing::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        self.store.keys()
    }

    /// Number of builds currently running.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Run `build` for `key` unless a build for that key is already running,
    /// in which case wait for it. The leader writes the result through
    /// `put`; a failing write is logged and the graph is still returned.
    /// Failed builds are shared with waiters and not cached.
    ///
    /// The build runs on its own task, so it completes and is cached even if
    /// every caller stops waiting. Must be called within a tokio runtime.
    pub async fn build_once<F, Fut>(&self, key: CacheKey, build: F) -> Result<Arc<CacheEntry>, GraphError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(GenericGraph, SourceMetadata), GraphError>> + Send + 'static,
    {
        let (shared, leader) = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                tracing::debug!("Joining in-flight build for {}", key);
                (existing.get().result.clone(), None)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let id = self.next_build.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = oneshot::channel();
                let dropped_key = key.clone();
                let result = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(GraphError::Internal(format!("graph build for {dropped_key} was dropped")))
                    })
                }
                .boxed()
                .shared();
                slot.insert(Inflight {
                    id,
                    result: result.clone(),
                });
                (result, Some((id, tx)))
            }
        };

        // Spawned after the map entry is released.
        if let Some((id, tx)) = leader {
            let pending = build();
            let store = Arc::clone(&self.store);
            let inflight = Arc::clone(&self.inflight);
            tokio::spawn(async move {
                let result = match AssertUnwindSafe(pending).catch_unwind().await {
                    Ok(built) => {
                        built.map(|(graph, metadata)| Arc::new(CacheEntry::new(key.clone(), graph, metadata)))
                    }
                    Err(_) => Err(GraphError::Internal(format!("graph build for {key} panicked"))),
                };
                if let Ok(entry) = &result {
                    if let Err(e) = store.put(Arc::clone(entry)) {
                        tracing::warn!("Cache write for {} failed, serving uncached: {}", key, e);
                    }
                }
                inflight.remove_if(&key, |_, running| running.id == id);
                // No receiver left means nobody is waiting; the entry is cached anyway.
                let _ = tx.send(result);
            });
        }
        shared.await
    }

    /// Drop in-flight bookkeeping. Running builds still finish, are cached,
    /// and reach the callers already awaiting them.
    pub fn shutdown(&self) {
        self.inflight.clear();
    }
}
