pub const DEFAULT_MAX_ENTRIES: u64 = 1024;
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 64 * 1024;
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 16;

/// Bounds of a [`FileCache`](super::FileCache).
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Maximum number of cached files. `0` disables caching.
    pub max_entries: u64,
    /// Files longer than this many bytes are never cached.
    pub max_entry_size: u64,
    /// Maximum number of files being read into memory at the same time.
    pub max_concurrent_loads: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self::default().with_max_entries(0)
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_entry_size(mut self, max_entry_size: u64) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    pub fn with_max_concurrent_loads(mut self, max_concurrent_loads: usize) -> Self {
        self.max_concurrent_loads = max_concurrent_loads;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0
    }
}
