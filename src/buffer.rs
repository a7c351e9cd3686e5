//! Pooled byte buffers used to hold materialized file content.
//!
//! A [`PooledBuffer`] is leased from a [`BufferPool`] and goes back to it exactly
//! once, when the buffer is dropped. Whoever owns the buffer decides when that
//! happens; for cached files that is the cache entry.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

const DEFAULT_MAX_IDLE: usize = 64;

#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    leased: AtomicUsize,
    released: AtomicUsize,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                max_idle,
                leased: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// Leases a buffer able to hold at least `capacity` bytes without reallocating.
    pub fn allocate(&self, capacity: usize) -> PooledBuffer {
        let reused = {
            let mut idle = self.inner.idle.lock();
            idle.iter()
                .position(|buf| buf.capacity() >= capacity)
                .map(|pos| idle.swap_remove(pos))
        };
        let buf = match reused {
            Some(buf) => buf,
            None => Vec::with_capacity(capacity),
        };
        self.inner.leased.fetch_add(1, Ordering::AcqRel);
        trace!("Leased buffer with capacity {}", buf.capacity());
        PooledBuffer {
            buf,
            pool: self.inner.clone(),
        }
    }

    /// Number of buffers currently leased and not yet returned.
    pub fn leased(&self) -> usize {
        self.inner.leased.load(Ordering::Acquire)
    }

    /// Total number of buffers returned to the pool so far.
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::Acquire)
    }

    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("leased", &self.leased())
            .field("released", &self.released())
            .field("max_idle", &self.inner.max_idle)
            .finish()
    }
}

pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buf.len()).finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        {
            let mut idle = self.pool.idle.lock();
            if idle.len() < self.pool.max_idle {
                idle.push(buf);
            }
        }
        self.pool.leased.fetch_sub(1, Ordering::AcqRel);
        self.pool.released.fetch_add(1, Ordering::AcqRel);
    }
}
