//! Files as seen by the service: backend handles, their freshness attributes and
//! the outcome of resolving a request path.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::Body;

use crate::buffer::{BufferPool, PooledBuffer};
use crate::cache::AggregatedFile;
use crate::error::{FileServiceError, Result};

mod encoding;
pub mod headers;

pub use encoding::ContentEncoding;

/// Freshness token of a file. Two snapshots describe the same content iff both
/// the length and the modification time are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    length: u64,
    last_modified: SystemTime,
}

impl FileAttributes {
    pub fn new(length: u64, last_modified: SystemTime) -> Self {
        Self {
            length,
            last_modified,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }
}

pub type ContentStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Access to the bytes behind an existing [`HttpFile`]. Each backend provides
/// its own implementation.
#[async_trait]
pub trait FileContent: Send + Sync + fmt::Debug {
    /// Opens the content for streaming.
    async fn open(&self) -> Result<ContentStream>;

    /// Reads at most `limit` bytes of the content into `buf`.
    async fn read_into(&self, buf: &mut PooledBuffer, limit: u64) -> Result<()>;
}

/// A file handle produced by a single backend lookup.
///
/// A lookup for a missing path still yields an `HttpFile`, one whose
/// [`attributes`](Self::attributes) are `None`.
#[derive(Debug, Clone)]
pub struct HttpFile {
    path: String,
    encoding: Option<ContentEncoding>,
    attrs: Option<FileAttributes>,
    content_type: String,
    date: SystemTime,
    content: Option<Arc<dyn FileContent>>,
}

impl HttpFile {
    pub fn new(
        path: impl Into<String>,
        encoding: Option<ContentEncoding>,
        attrs: FileAttributes,
        date: SystemTime,
        content: Arc<dyn FileContent>,
    ) -> Self {
        let path = path.into();
        let content_type = headers::guess_content_type(&path, encoding);
        Self {
            path,
            encoding,
            attrs: Some(attrs),
            content_type,
            date,
            content: Some(content),
        }
    }

    pub fn non_existent(
        path: impl Into<String>,
        encoding: Option<ContentEncoding>,
        date: SystemTime,
    ) -> Self {
        let path = path.into();
        let content_type = headers::guess_content_type(&path, encoding);
        Self {
            path,
            encoding,
            attrs: None,
            content_type,
            date,
            content: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encoding(&self) -> Option<ContentEncoding> {
        self.encoding
    }

    pub fn exists(&self) -> bool {
        self.attrs.is_some()
    }

    pub fn attributes(&self) -> Option<FileAttributes> {
        self.attrs
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn date(&self) -> SystemTime {
        self.date
    }

    pub fn headers(&self) -> HeaderMap {
        match &self.attrs {
            Some(attrs) => {
                headers::build_headers(attrs, &self.content_type, self.encoding, Some(self.date))
            }
            None => HeaderMap::new(),
        }
    }

    fn existing_content(&self) -> Result<&Arc<dyn FileContent>> {
        self.content.as_ref().ok_or_else(|| {
            FileServiceError::backend(
                self.path.clone(),
                io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
            )
        })
    }

    pub async fn open(&self) -> Result<ContentStream> {
        self.existing_content()?.open().await
    }

    /// Reads the whole file into a buffer leased from `pool`.
    pub async fn aggregate(&self, pool: &BufferPool) -> Result<AggregatedFile> {
        let content = self.existing_content()?;
        let attrs = self.attrs.ok_or_else(|| {
            FileServiceError::backend(
                self.path.clone(),
                io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
            )
        })?;
        let capacity = usize::try_from(attrs.length()).map_err(|_| {
            FileServiceError::backend(
                self.path.clone(),
                io::Error::new(io::ErrorKind::OutOfMemory, "file too large to aggregate"),
            )
        })?;

        let mut buf = pool.allocate(capacity);
        content.read_into(&mut buf, attrs.length()).await?;
        if buf.len() as u64 != attrs.length() {
            // The file changed between the lookup and the read.
            return Err(FileServiceError::backend(
                self.path.clone(),
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read {} of {} bytes", buf.len(), attrs.length()),
                ),
            ));
        }
        let headers = headers::build_headers(&attrs, &self.content_type, self.encoding, None);
        Ok(AggregatedFile::new(
            self.path.clone(),
            self.encoding,
            attrs,
            self.content_type.clone(),
            headers,
            buf,
        ))
    }
}

/// A file chosen to answer a request.
#[derive(Debug, Clone)]
pub enum ServedFile {
    /// Fully materialized content, either from the cache or generated.
    /// `date` comes from the lookup that selected it, not from the load.
    Aggregated {
        file: Arc<AggregatedFile>,
        date: SystemTime,
    },
    /// Content streamed from the backend on demand.
    Streamed(HttpFile),
}

impl ServedFile {
    pub fn aggregated(file: Arc<AggregatedFile>, date: SystemTime) -> Self {
        ServedFile::Aggregated { file, date }
    }

    pub fn path(&self) -> &str {
        match self {
            ServedFile::Aggregated { file, .. } => file.path(),
            ServedFile::Streamed(file) => file.path(),
        }
    }

    pub fn attributes(&self) -> Option<FileAttributes> {
        match self {
            ServedFile::Aggregated { file, .. } => Some(file.attributes()),
            ServedFile::Streamed(file) => file.attributes(),
        }
    }

    pub fn content_encoding(&self) -> Option<ContentEncoding> {
        match self {
            ServedFile::Aggregated { file, .. } => file.encoding(),
            ServedFile::Streamed(file) => file.encoding(),
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            ServedFile::Aggregated { file, .. } => file.content_type(),
            ServedFile::Streamed(file) => file.content_type(),
        }
    }

    pub fn date(&self) -> SystemTime {
        match self {
            ServedFile::Aggregated { date, .. } => *date,
            ServedFile::Streamed(file) => file.date(),
        }
    }

    pub fn headers(&self) -> HeaderMap {
        match self {
            ServedFile::Aggregated { file, date } => {
                let mut headers = file.headers().clone();
                if let Ok(value) = HeaderValue::from_str(&headers::http_date(*date)) {
                    headers.insert(header::DATE, value);
                }
                headers
            }
            ServedFile::Streamed(file) => file.headers(),
        }
    }

    /// Length of the body this file will produce, when it is known up front.
    /// Streamed content is read after the lookup and may no longer match the
    /// length it reported.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            ServedFile::Aggregated { file, .. } => Some(file.content().len() as u64),
            ServedFile::Streamed(_) => None,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self, ServedFile::Aggregated { .. })
    }

    /// Collects the complete content.
    pub async fn bytes(&self) -> Result<Bytes> {
        match self {
            ServedFile::Aggregated { file, .. } => Ok(file.to_bytes()),
            ServedFile::Streamed(file) => {
                let path = file.path().to_string();
                let collected = file
                    .open()
                    .await?
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
                    .map_err(|e| FileServiceError::backend(path, e))?;
                Ok(collected.freeze())
            }
        }
    }

    pub async fn into_body(self) -> Result<Body> {
        match self {
            ServedFile::Aggregated { file, .. } => Ok(Body::from(file.to_bytes())),
            ServedFile::Streamed(file) => Ok(Body::wrap_stream(file.open().await?)),
        }
    }
}

/// Terminal outcome of resolving one request path.
#[derive(Debug, Clone)]
pub enum Resolution {
    Serve(ServedFile),
    /// Redirect to the given location, typically the path with `/` appended.
    Redirect(String),
    NotFound,
}

impl Resolution {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Resolution::NotFound)
    }

    pub fn served(&self) -> Option<&ServedFile> {
        match self {
            Resolution::Serve(file) => Some(file),
            _ => None,
        }
    }
}
