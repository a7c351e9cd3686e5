use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use rust_embed::RustEmbed;

use super::{ensure_valid_path, normalize_root, Clock, Vfs};
use crate::buffer::PooledBuffer;
use crate::error::{FileServiceError, Result};
use crate::file::{ContentEncoding, ContentStream, FileAttributes, FileContent, HttpFile};

/// Serves files compiled into the binary with `#[derive(RustEmbed)]`.
///
/// `root` selects a sub-directory of the embedded folder; `""` or `"/"` serves
/// the whole folder.
pub struct EmbeddedVfs<A> {
    root: String,
    _assets: PhantomData<fn() -> A>,
}

impl<A: RustEmbed> EmbeddedVfs<A> {
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_root(root),
            _assets: PhantomData,
        }
    }

    fn resource_path(&self, path: &str) -> Result<String> {
        ensure_valid_path(path)?;
        Ok(if self.root.is_empty() {
            path[1..].to_string()
        } else {
            format!("{}{}", self.root, path)
        })
    }

    /// Prefix shared by every embedded name inside the directory at `path`.
    fn dir_prefix(&self, path: &str) -> Result<String> {
        let mut prefix = self.resource_path(path)?;
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(prefix)
    }
}

impl<A> fmt::Debug for EmbeddedVfs<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedVfs").field("root", &self.root).finish()
    }
}

#[async_trait]
impl<A: RustEmbed + 'static> Vfs for EmbeddedVfs<A> {
    async fn get(
        &self,
        path: &str,
        clock: &dyn Clock,
        encoding: Option<ContentEncoding>,
    ) -> Result<HttpFile> {
        let resource_path = self.resource_path(path)?;
        let Some(file) = A::get(&resource_path) else {
            return Ok(HttpFile::non_existent(path, encoding, clock.now()));
        };

        // Assets without a recorded timestamp get a constant one so their
        // freshness token does not change between lookups.
        let modified = file
            .metadata
            .last_modified()
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap_or(UNIX_EPOCH);
        let attrs = FileAttributes::new(file.data.len() as u64, modified);
        Ok(HttpFile::new(
            path,
            encoding,
            attrs,
            clock.now(),
            Arc::new(EmbeddedContent { data: file.data }),
        ))
    }

    async fn can_list(&self, path: &str) -> bool {
        match self.dir_prefix(path) {
            Ok(prefix) => A::iter().any(|name| name.len() > prefix.len() && name.starts_with(&prefix)),
            Err(_) => false,
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let prefix = self.dir_prefix(path)?;
        let children: BTreeSet<String> = A::iter()
            .filter_map(|name| {
                let rest = name.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    return None;
                }
                Some(match rest.find('/') {
                    Some(end) => format!("{}/", &rest[..end]),
                    None => rest.to_string(),
                })
            })
            .collect();
        if children.is_empty() {
            return Err(FileServiceError::NotListable(path.to_string()));
        }
        Ok(children.into_iter().collect())
    }

    fn meter_tag(&self) -> String {
        format!("embedded:{}", self.root)
    }
}

struct EmbeddedContent {
    data: Cow<'static, [u8]>,
}

impl fmt::Debug for EmbeddedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedContent")
            .field("len", &self.data.len())
            .finish()
    }
}

#[async_trait]
impl FileContent for EmbeddedContent {
    async fn open(&self) -> Result<ContentStream> {
        let bytes = match self.data {
            Cow::Borrowed(data) => Bytes::from_static(data),
            Cow::Owned(ref data) => Bytes::copy_from_slice(data),
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(bytes) })))
    }

    async fn read_into(&self, buf: &mut PooledBuffer, limit: u64) -> Result<()> {
        let end = usize::try_from(limit).unwrap_or(usize::MAX).min(self.data.len());
        buf.extend_from_slice(&self.data[..end]);
        Ok(())
    }
}
