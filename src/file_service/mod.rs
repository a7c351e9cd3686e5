//! The static file service: variant negotiation, directory handling and caching
//! on top of a [`Vfs`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::buffer::BufferPool;
use crate::cache::{AggregatedFile, CachePolicy, CacheStats, FileCache};
use crate::config::FileServiceConfig;
use crate::error::Result;
use crate::file::{ContentEncoding, Resolution, ServedFile};
use crate::service::{HttpService, ServiceRequest};
use crate::vfs::{ensure_valid_path, Clock, FileSystemVfs, SystemClock, Vfs};

pub mod auto_index;

const INDEX_FILE: &str = "index.html";

pub struct HttpFileService {
    name: String,
    cache: FileCache,
    auto_index: bool,
    serve_compressed_files: bool,
}

impl HttpFileService {
    pub fn builder<V: Vfs + 'static>(vfs: V) -> HttpFileServiceBuilder {
        HttpFileServiceBuilder::new(Arc::new(vfs))
    }

    pub fn for_file_system<P: AsRef<Path>>(root: P) -> Self {
        Self::builder(FileSystemVfs::new(root)).build()
    }

    /// Builds a service over the file system directory named in `config`.
    pub fn from_config(config: &FileServiceConfig) -> Self {
        Self::builder(FileSystemVfs::new(&config.root))
            .config(config)
            .build()
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Encodings worth probing for this request, in priority order.
    fn accepted_encodings(&self, req: &ServiceRequest) -> Vec<ContentEncoding> {
        match req.accept_encoding() {
            Some(accept) if self.serve_compressed_files => ContentEncoding::parse_accepted(accept),
            _ => Vec::new(),
        }
    }

    /// Returns the first existing precompressed variant of `path`, or `path`
    /// itself when no variant exists.
    pub async fn find_variant(
        &self,
        path: &str,
        encodings: &[ContentEncoding],
    ) -> Result<Option<ServedFile>> {
        for &encoding in encodings {
            let variant = format!("{}{}", path, encoding.extension());
            if let Some(file) = self.cache.get(&variant, Some(encoding)).await? {
                debug!("Serving {} as {}", path, variant);
                return Ok(Some(file));
            }
        }
        self.cache.get(path, None).await
    }

    /// Resolves a request: the exact file, then `index.html` or a generated
    /// listing for directory paths, or a redirect to the directory form of a
    /// path that names a directory.
    pub async fn find_file(&self, req: &ServiceRequest) -> Result<Resolution> {
        let path = req.mapped_path();
        ensure_valid_path(path)?;
        let encodings = self.accepted_encodings(req);

        if let Some(file) = self.find_variant(path, &encodings).await? {
            return Ok(Resolution::Serve(file));
        }

        if path.ends_with('/') {
            let index = format!("{path}{INDEX_FILE}");
            if let Some(file) = self.find_variant(&index, &encodings).await? {
                return Ok(Resolution::Serve(file));
            }

            let vfs = self.cache.vfs();
            if self.auto_index && vfs.can_list(path).await {
                let listing = vfs.list(path).await?;
                debug!("Generating listing of {} ({} entries)", path, listing.len());
                let html = auto_index::listing_to_html(req.decoded_path(), &listing);
                let mut buf = self.cache.pool().allocate(html.len());
                buf.extend_from_slice(html.as_bytes());
                let page = AggregatedFile::generated(
                    path,
                    auto_index::CONTENT_TYPE,
                    buf,
                    self.cache.clock().now(),
                );
                let date = page.attributes().last_modified();
                return Ok(Resolution::Serve(ServedFile::aggregated(Arc::new(page), date)));
            }
        } else {
            let index = format!("{path}/{INDEX_FILE}");
            let is_directory = self.find_variant(&index, &encodings).await?.is_some()
                || (self.auto_index && self.cache.vfs().can_list(path).await);
            if is_directory {
                return Ok(Resolution::Redirect(format!("{}/", req.path())));
            }
        }

        Ok(Resolution::NotFound)
    }
}

#[async_trait]
impl HttpService for HttpFileService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn serve(&self, req: &ServiceRequest) -> Result<Resolution> {
        self.find_file(req).await
    }

    async fn shutdown(&self) {
        info!("Shutting down {}", self.name);
        self.cache.clear().await;
    }
}

impl std::fmt::Debug for HttpFileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFileService")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("auto_index", &self.auto_index)
            .field("serve_compressed_files", &self.serve_compressed_files)
            .finish()
    }
}

pub struct HttpFileServiceBuilder {
    vfs: Arc<dyn Vfs>,
    policy: CachePolicy,
    auto_index: bool,
    serve_compressed_files: bool,
    clock: Arc<dyn Clock>,
    pool: Option<BufferPool>,
}

impl HttpFileServiceBuilder {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Self {
            vfs,
            policy: CachePolicy::default(),
            auto_index: false,
            serve_compressed_files: false,
            clock: Arc::new(SystemClock),
            pool: None,
        }
    }

    pub fn config(mut self, config: &FileServiceConfig) -> Self {
        self.policy = CachePolicy::default()
            .with_max_entries(config.max_cache_entries)
            .with_max_entry_size(config.max_cache_entry_size)
            .with_max_concurrent_loads(config.max_concurrent_loads);
        self.auto_index = config.auto_index;
        self.serve_compressed_files = config.serve_compressed_files;
        self.pool = Some(BufferPool::new(config.max_pooled_buffers));
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_cache_entries(mut self, max_entries: u64) -> Self {
        self.policy.max_entries = max_entries;
        self
    }

    pub fn max_cache_entry_size(mut self, max_entry_size: u64) -> Self {
        self.policy.max_entry_size = max_entry_size;
        self
    }

    pub fn auto_index(mut self, enabled: bool) -> Self {
        self.auto_index = enabled;
        self
    }

    pub fn serve_compressed_files(mut self, enabled: bool) -> Self {
        self.serve_compressed_files = enabled;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn buffer_pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> HttpFileService {
        let name = format!("files[{}]", self.vfs.meter_tag());
        let pool = self.pool.unwrap_or_default();
        HttpFileService {
            cache: FileCache::new(self.vfs, self.policy, pool, self.clock),
            name,
            auto_index: self.auto_index,
            serve_compressed_files: self.serve_compressed_files,
        }
    }
}
