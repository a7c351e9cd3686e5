//! In-memory cache of small files, validated against the backend on every use.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::future::Cache;
use moka::notification::RemovalCause;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::error::{FileServiceError, Result};
use crate::file::{ContentEncoding, HttpFile, ServedFile};
use crate::vfs::{Clock, Vfs};

mod entry;
mod policy;

pub use entry::{AggregatedFile, CacheKey};
pub use policy::{
    CachePolicy, DEFAULT_MAX_CONCURRENT_LOADS, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_ENTRY_SIZE,
};

/// Looks files up in a [`Vfs`] and keeps the small ones in memory.
///
/// Every call performs a fresh backend lookup first. A cached copy is only
/// returned while its length and modification time still match that lookup;
/// otherwise it is dropped and read again. Concurrent misses on the same key
/// share one read.
pub struct FileCache {
    vfs: Arc<dyn Vfs>,
    clock: Arc<dyn Clock>,
    pool: BufferPool,
    policy: CachePolicy,
    entries: Option<Cache<CacheKey, Arc<AggregatedFile>>>,
    loads: Arc<Semaphore>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    evictions: AtomicU64,
}

impl FileCache {
    pub fn new(
        vfs: Arc<dyn Vfs>,
        policy: CachePolicy,
        pool: BufferPool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Initializing file cache for {} (max entries: {}, max entry size: {} bytes)",
            vfs.meter_tag(),
            policy.max_entries,
            policy.max_entry_size
        );
        let counters = Arc::new(Counters::default());
        let entries = policy.is_enabled().then(|| {
            let evictions = counters.clone();
            Cache::builder()
                .max_capacity(policy.max_entries)
                .eviction_listener(
                    move |key: Arc<CacheKey>, file: Arc<AggregatedFile>, cause: RemovalCause| {
                        if cause.was_evicted() {
                            evictions.evictions.fetch_add(1, Ordering::Relaxed);
                        }
                        debug!(
                            "Removed cached file {} ({:?}, {} bytes, cached since {}, {:?})",
                            key.path(),
                            key.encoding(),
                            file.content().len(),
                            file.materialized_at().to_rfc3339(),
                            cause
                        );
                        // Dropping the cache's reference hands the buffer back to
                        // the pool unless a response is still using it.
                        drop(file);
                    },
                )
                .build()
        });

        Self {
            vfs,
            clock,
            pool,
            loads: Arc::new(Semaphore::new(policy.max_concurrent_loads.max(1))),
            policy,
            entries,
            counters,
        }
    }

    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Resolves `path` tagged with `encoding`, returning `None` when the backend
    /// has no such file.
    pub async fn get(
        &self,
        path: &str,
        encoding: Option<ContentEncoding>,
    ) -> Result<Option<ServedFile>> {
        let live = self.vfs.get(path, self.clock.as_ref(), encoding).await?;
        let Some(entries) = &self.entries else {
            return Ok(live.exists().then(|| ServedFile::Streamed(live)));
        };

        let key = CacheKey::new(path, encoding);
        let Some(attrs) = live.attributes() else {
            // The file may have existed before.
            self.invalidate(&key).await;
            return Ok(None);
        };

        if attrs.length() > self.policy.max_entry_size {
            // The file may have been small before.
            self.invalidate(&key).await;
            self.counters.bypassed.fetch_add(1, Ordering::Relaxed);
            debug!("Serving {} uncached ({} bytes)", path, attrs.length());
            return Ok(Some(ServedFile::Streamed(live)));
        }

        if let Some(cached) = entries.get(&key).await {
            if cached.attributes() == attrs {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {} ({:?})", path, encoding);
                return Ok(Some(ServedFile::aggregated(cached, live.date())));
            }
            debug!(
                "Cached copy of {} is stale (cached: {:?}, live: {:?})",
                path,
                cached.attributes(),
                attrs
            );
            self.invalidate(&key).await;
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {} ({:?})", path, encoding);
        self.populate(entries, key, live).await.map(Some)
    }

    async fn populate(
        &self,
        entries: &Cache<CacheKey, Arc<AggregatedFile>>,
        key: CacheKey,
        live: HttpFile,
    ) -> Result<ServedFile> {
        let entries = entries.clone();
        let pool = self.pool.clone();
        let loads = self.loads.clone();
        let date = live.date();
        let path = key.path().to_string();

        // The load and the insert both run on their own task, so a finished
        // read lands in the cache even when every waiting request has gone.
        let task = tokio::spawn(async move {
            let load = async move {
                let _permit = loads
                    .acquire_owned()
                    .await
                    .map_err(|e| FileServiceError::Server(e.to_string()))?;
                live.aggregate(&pool).await.map(Arc::new)
            };
            entries.try_get_with(key, load).await
        });

        match task.await {
            Ok(Ok(file)) => Ok(ServedFile::aggregated(file, date)),
            Ok(Err(e)) => {
                warn!("Failed to cache {}: {}", path, e);
                Err(e.into())
            }
            Err(e) => Err(FileServiceError::backend(path, io::Error::other(e))),
        }
    }

    /// Returns the cached copy for `key` without consulting the backend.
    pub async fn peek(&self, key: &CacheKey) -> Option<Arc<AggregatedFile>> {
        match &self.entries {
            Some(entries) => entries.get(key).await,
            None => None,
        }
    }

    /// Removes the entry for `key`. The cache's hold on the entry's buffer is
    /// released before this returns.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Some(entries) = &self.entries {
            if entries.contains_key(key) {
                entries.invalidate(key).await;
                entries.run_pending_tasks().await;
            }
        }
    }

    /// Removes every entry, releasing the cache's hold on all buffers.
    pub async fn clear(&self) {
        if let Some(entries) = &self.entries {
            let count = entries.entry_count();
            entries.invalidate_all();
            entries.run_pending_tasks().await;
            info!("Cleared file cache for {} ({} entries)", self.vfs.meter_tag(), count);
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let entry_count = match &self.entries {
            Some(entries) => {
                entries.run_pending_tasks().await;
                entries.entry_count()
            }
            None => 0,
        };
        let stats = CacheStats {
            entry_count,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            bypassed: self.counters.bypassed.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            max_entries: self.policy.max_entries,
            max_entry_size: self.policy.max_entry_size,
        };
        debug!("Cache stats: {:?}", stats);
        stats
    }
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("vfs", &self.vfs)
            .field("policy", &self.policy)
            .field("enabled", &self.entries.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub bypassed: u64,
    pub evictions: u64,
    pub max_entries: u64,
    pub max_entry_size: u64,
}
