use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::{ensure_valid_path, Clock, Vfs};
use crate::buffer::PooledBuffer;
use crate::error::{FileServiceError, Result};
use crate::file::{ContentEncoding, ContentStream, FileAttributes, FileContent, HttpFile};

#[cfg(unix)]
const ENOTDIR: i32 = 20;

/// Serves files below a directory of the local file system.
#[derive(Debug, Clone)]
pub struct FileSystemVfs {
    root: PathBuf,
}

impl FileSystemVfs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        // Rebuilding from components drops a trailing separator.
        let root: PathBuf = root.as_ref().components().collect();
        debug!("File system source rooted at {:?}", root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        ensure_valid_path(path)?;
        Ok(self.root.join(path.trim_start_matches('/')))
    }
}

fn is_missing(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || is_not_a_directory(err)
}

#[cfg(unix)]
fn is_not_a_directory(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ENOTDIR)
}

#[cfg(not(unix))]
fn is_not_a_directory(_err: &io::Error) -> bool {
    false
}

#[async_trait]
impl Vfs for FileSystemVfs {
    async fn get(
        &self,
        path: &str,
        clock: &dyn Clock,
        encoding: Option<ContentEncoding>,
    ) -> Result<HttpFile> {
        let file_path = self.resolve(path)?;
        match tokio::fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => {
                let modified = meta.modified().unwrap_or(UNIX_EPOCH);
                let attrs = FileAttributes::new(meta.len(), modified);
                Ok(HttpFile::new(
                    path,
                    encoding,
                    attrs,
                    clock.now(),
                    Arc::new(FileSystemContent { path: file_path }),
                ))
            }
            Ok(_) => Ok(HttpFile::non_existent(path, encoding, clock.now())),
            Err(e) if is_missing(&e) => Ok(HttpFile::non_existent(path, encoding, clock.now())),
            Err(e) => {
                warn!("Failed to stat {:?}: {}", file_path, e);
                Err(FileServiceError::backend(path, e))
            }
        }
    }

    async fn can_list(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(dir) => tokio::fs::metadata(&dir)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(path)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if is_missing(&e) => return Err(FileServiceError::NotListable(path.to_string())),
            Err(e) => return Err(FileServiceError::backend(path, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| FileServiceError::backend(path, e))?
        {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .map_err(|e| FileServiceError::backend(path, e))?;
            if is_dir {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn meter_tag(&self) -> String {
        format!("file:{}", self.root.display())
    }
}

#[derive(Debug)]
struct FileSystemContent {
    path: PathBuf,
}

impl FileSystemContent {
    fn backend_error(&self, err: io::Error) -> FileServiceError {
        FileServiceError::backend(self.path.display().to_string(), err)
    }
}

#[async_trait]
impl FileContent for FileSystemContent {
    async fn open(&self) -> Result<ContentStream> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn read_into(&self, buf: &mut PooledBuffer, limit: u64) -> Result<()> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.backend_error(e))?;
        file.take(limit)
            .read_to_end(buf.as_mut_vec())
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::vfs::SystemClock;
    use tokio::test;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), b"<h1>docs</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs/img")).unwrap();
        dir
    }

    #[test]
    async fn existing_file_has_attributes() {
        let dir = fixture();
        let vfs = FileSystemVfs::new(dir.path());
        let file = vfs.get("/a.txt", &SystemClock, None).await.unwrap();
        assert!(file.exists());
        assert_eq!(file.attributes().unwrap().length(), 10);
        assert_eq!(file.content_type(), "text/plain; charset=utf-8");

        let pool = BufferPool::default();
        let aggregated = file.aggregate(&pool).await.unwrap();
        assert_eq!(aggregated.content(), b"0123456789");
    }

    #[test]
    async fn missing_files_and_directories_do_not_exist() {
        let dir = fixture();
        let vfs = FileSystemVfs::new(dir.path());
        assert!(!vfs.get("/nope.txt", &SystemClock, None).await.unwrap().exists());
        assert!(!vfs.get("/docs", &SystemClock, None).await.unwrap().exists());
        assert!(!vfs.get("/docs/", &SystemClock, None).await.unwrap().exists());
        assert!(!vfs.get("/a.txt/child", &SystemClock, None).await.unwrap().exists());
    }

    #[test]
    async fn trailing_separator_on_root_is_tolerated() {
        let dir = fixture();
        let with_slash = FileSystemVfs::new(format!("{}/", dir.path().display()));
        let without = FileSystemVfs::new(dir.path());
        assert_eq!(with_slash.root(), without.root());
        assert!(with_slash.get("/a.txt", &SystemClock, None).await.unwrap().exists());
    }

    #[test]
    async fn traversal_is_rejected_before_touching_disk() {
        let dir = fixture();
        let vfs = FileSystemVfs::new(dir.path().join("docs"));
        let err = vfs.get("/../a.txt", &SystemClock, None).await.unwrap_err();
        assert!(err.is_invalid_path());
        assert!(!vfs.can_list("/../").await);
    }

    #[test]
    async fn listing_marks_directories_and_sorts() {
        let dir = fixture();
        let vfs = FileSystemVfs::new(dir.path());
        assert!(vfs.can_list("/").await);
        assert!(vfs.can_list("/docs/").await);
        assert!(!vfs.can_list("/a.txt").await);
        assert_eq!(vfs.list("/").await.unwrap(), vec!["a.txt", "docs/"]);
        assert_eq!(vfs.list("/docs/").await.unwrap(), vec!["img/", "index.html"]);
        assert!(vfs.list("/missing/").await.unwrap_err().is_backend());
    }

    #[test]
    async fn meter_tag_names_root() {
        let vfs = FileSystemVfs::new("/srv/www/");
        assert_eq!(vfs.meter_tag(), "file:/srv/www");
    }
}
