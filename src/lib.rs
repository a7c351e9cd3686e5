pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod file_service;
pub mod logger;
pub mod server;
pub mod service;
pub mod utils;
pub mod vfs;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{FileServiceError, Result};

pub mod prelude {
    pub use crate::buffer::BufferPool;
    pub use crate::cache::{CachePolicy, CacheStats, FileCache};
    pub use crate::file::{ContentEncoding, FileAttributes, HttpFile, Resolution, ServedFile};
    pub use crate::file_service::{HttpFileService, HttpFileServiceBuilder};
    pub use crate::server::FileServer;
    pub use crate::service::{HttpService, HttpServiceExt, OrElse, ServiceRequest};
    pub use crate::vfs::{Clock, EmbeddedVfs, FileSystemVfs, SystemClock, Vfs};
}
