use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::header::HeaderMap;

use crate::buffer::PooledBuffer;
use crate::file::{headers, ContentEncoding, FileAttributes};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    encoding: Option<ContentEncoding>,
}

impl CacheKey {
    pub fn new(path: impl Into<String>, encoding: Option<ContentEncoding>) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encoding(&self) -> Option<ContentEncoding> {
        self.encoding
    }
}

/// A file read completely into a pooled buffer, together with the attribute
/// snapshot taken when it was read. Never mutated once built.
#[derive(Debug)]
pub struct AggregatedFile {
    path: String,
    encoding: Option<ContentEncoding>,
    attrs: FileAttributes,
    content_type: String,
    headers: HeaderMap,
    content: PooledBuffer,
    materialized_at: DateTime<Utc>,
}

impl AggregatedFile {
    pub(crate) fn new(
        path: String,
        encoding: Option<ContentEncoding>,
        attrs: FileAttributes,
        content_type: String,
        headers: HeaderMap,
        content: PooledBuffer,
    ) -> Self {
        Self {
            path,
            encoding,
            attrs,
            content_type,
            headers,
            content,
            materialized_at: Utc::now(),
        }
    }

    /// Wraps content produced by the service itself, such as a directory listing.
    pub fn generated(
        path: impl Into<String>,
        content_type: impl Into<String>,
        content: PooledBuffer,
        date: SystemTime,
    ) -> Self {
        let content_type = content_type.into();
        let attrs = FileAttributes::new(content.len() as u64, date);
        let headers = headers::build_headers(&attrs, &content_type, None, None);
        Self::new(path.into(), None, attrs, content_type, headers, content)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encoding(&self) -> Option<ContentEncoding> {
        self.encoding
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attrs
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn materialized_at(&self) -> DateTime<Utc> {
        self.materialized_at
    }

    /// Exposes the content without copying. The pooled buffer stays leased until
    /// the last returned `Bytes` and the last `Arc` are dropped.
    pub fn to_bytes(self: &Arc<Self>) -> Bytes {
        Bytes::from_owner(SharedContent(self.clone()))
    }
}

struct SharedContent(Arc<AggregatedFile>);

impl AsRef<[u8]> for SharedContent {
    fn as_ref(&self) -> &[u8] {
        self.0.content()
    }
}
