//! Virtual file systems the file service reads from.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{FileServiceError, Result};
use crate::file::{ContentEncoding, HttpFile};

mod embedded;
mod file_system;

pub use embedded::EmbeddedVfs;
pub use file_system::FileSystemVfs;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A source of files addressed by absolute logical paths such as `/css/site.css`.
///
/// Lookups hold no state between calls and may run concurrently.
#[async_trait]
pub trait Vfs: Send + Sync + fmt::Debug {
    /// Looks up the file at `path`. A missing file is reported as an [`HttpFile`]
    /// that does not exist, not as an error.
    async fn get(
        &self,
        path: &str,
        clock: &dyn Clock,
        encoding: Option<ContentEncoding>,
    ) -> Result<HttpFile>;

    /// Whether `path` denotes a directory whose entries can be listed.
    async fn can_list(&self, _path: &str) -> bool {
        false
    }

    /// Lists the entries of the directory at `path`, sorted by name.
    /// Sub-directories carry a trailing `/`.
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        Err(FileServiceError::NotListable(path.to_string()))
    }

    /// Label identifying this source in diagnostics.
    fn meter_tag(&self) -> String;
}

#[async_trait]
impl<V: Vfs + ?Sized> Vfs for Arc<V> {
    async fn get(
        &self,
        path: &str,
        clock: &dyn Clock,
        encoding: Option<ContentEncoding>,
    ) -> Result<HttpFile> {
        (**self).get(path, clock, encoding).await
    }

    async fn can_list(&self, path: &str) -> bool {
        (**self).can_list(path).await
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        (**self).list(path).await
    }

    fn meter_tag(&self) -> String {
        (**self).meter_tag()
    }
}

/// Rejects paths that are not absolute or that could escape the root.
pub fn ensure_valid_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(FileServiceError::InvalidPath(format!("{path} (not absolute)")));
    }
    if path.contains('\0') || path.contains('\\') {
        return Err(FileServiceError::InvalidPath(path.to_string()));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(FileServiceError::InvalidPath(format!("{path} (escapes root)")));
    }
    Ok(())
}

/// Strips one leading and one trailing `/` so `/static/`, `static/` and
/// `/static` all name the same root.
pub(crate) fn normalize_root(root: &str) -> String {
    let root = root.strip_prefix('/').unwrap_or(root);
    let root = root.strip_suffix('/').unwrap_or(root);
    root.to_string()
}
