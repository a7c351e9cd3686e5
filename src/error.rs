use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileServiceError>;

#[derive(Error, Debug)]
pub enum FileServiceError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Backend error for {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Not a listable directory: {0}")]
    NotListable(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Server error: {0}")]
    Server(String),
    /// An error raised by a cache population that several requests were waiting on.
    #[error(transparent)]
    Shared(Arc<FileServiceError>),
}

impl FileServiceError {
    pub fn backend(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Backend {
            path: path.into(),
            source,
        }
    }

    pub fn is_invalid_path(&self) -> bool {
        match self {
            Self::InvalidPath(_) => true,
            Self::Shared(inner) => inner.is_invalid_path(),
            _ => false,
        }
    }

    pub fn is_backend(&self) -> bool {
        match self {
            Self::Backend { .. } | Self::NotListable(_) => true,
            Self::Shared(inner) => inner.is_backend(),
            _ => false,
        }
    }
}

impl From<Arc<FileServiceError>> for FileServiceError {
    fn from(err: Arc<FileServiceError>) -> Self {
        Self::Shared(err)
    }
}
