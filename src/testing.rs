//! In-memory source that counts backend traffic, for unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::buffer::PooledBuffer;
use crate::error::{FileServiceError, Result};
use crate::file::{ContentEncoding, ContentStream, FileAttributes, FileContent, HttpFile};
use crate::vfs::{ensure_valid_path, Clock, Vfs};

#[derive(Debug, Default)]
pub(crate) struct MemoryVfs {
    files: Mutex<HashMap<String, (Bytes, SystemTime)>>,
    delays: Mutex<HashMap<String, Duration>>,
    stats: Arc<Traffic>,
    read_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Traffic {
    lookups: AtomicUsize,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemoryVfs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Delays reads of `path` only, overriding the delay for all paths.
    pub(crate) fn slow_reads(&self, path: &str, delay: Duration) {
        self.delays.lock().insert(path.to_string(), delay);
    }

    pub(crate) fn put(&self, path: &str, data: &[u8], modified: SystemTime) {
        self.files
            .lock()
            .insert(path.to_string(), (Bytes::copy_from_slice(data), modified));
    }

    pub(crate) fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.stats.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn lookups(&self) -> usize {
        self.stats.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> usize {
        self.stats.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Vfs for MemoryVfs {
    async fn get(
        &self,
        path: &str,
        clock: &dyn Clock,
        encoding: Option<ContentEncoding>,
    ) -> Result<HttpFile> {
        ensure_valid_path(path)?;
        self.stats.lookups.fetch_add(1, Ordering::SeqCst);
        let found = self.files.lock().get(path).cloned();
        Ok(match found {
            Some((data, modified)) => HttpFile::new(
                path,
                encoding,
                FileAttributes::new(data.len() as u64, modified),
                clock.now(),
                Arc::new(MemoryContent {
                    data,
                    stats: self.stats.clone(),
                    delay: self.delays.lock().get(path).copied().or(self.read_delay),
                }),
            ),
            None => HttpFile::non_existent(path, encoding, clock.now()),
        })
    }

    async fn can_list(&self, path: &str) -> bool {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.files.lock().keys().any(|name| name.starts_with(&prefix))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let mut names: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .map(|rest| match rest.find('/') {
                Some(end) => format!("{}/", &rest[..end]),
                None => rest.to_string(),
            })
            .collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return Err(FileServiceError::NotListable(path.to_string()));
        }
        Ok(names)
    }

    fn meter_tag(&self) -> String {
        "memory".to_string()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub(crate) fn new(now: SystemTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn set(&self, now: SystemTime) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

#[derive(Debug)]
struct MemoryContent {
    data: Bytes,
    stats: Arc<Traffic>,
    delay: Option<Duration>,
}

#[async_trait]
impl FileContent for MemoryContent {
    async fn open(&self) -> Result<ContentStream> {
        let data = self.data.clone();
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn read_into(&self, buf: &mut PooledBuffer, limit: u64) -> Result<()> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.stats.fail_reads.load(Ordering::SeqCst) {
            return Err(FileServiceError::backend(
                "memory",
                io::Error::new(io::ErrorKind::Other, "injected read failure"),
            ));
        }
        let end = usize::try_from(limit).unwrap_or(usize::MAX).min(self.data.len());
        buf.extend_from_slice(&self.data[..end]);
        Ok(())
    }
}
