use serde::Deserialize;
use std::path::PathBuf;

use crate::cache::{DEFAULT_MAX_CONCURRENT_LOADS, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_ENTRY_SIZE};
use crate::error::{FileServiceError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FileServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path prefix the file service is mounted under.
    pub mount_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileServiceConfig {
    pub root: PathBuf,
    /// 0 disables the cache.
    pub max_cache_entries: u64,
    pub max_cache_entry_size: u64,
    pub auto_index: bool,
    pub serve_compressed_files: bool,
    pub max_concurrent_loads: usize,
    pub max_pooled_buffers: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        // CONFIG_PATH takes precedence over the built-in defaults
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            return Self::from_file(&config_path);
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FileServiceError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FileServiceError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.root.as_os_str().is_empty() {
            return Err(FileServiceError::Config("files.root must not be empty".into()));
        }
        if !self.server.mount_path.starts_with('/') {
            return Err(FileServiceError::Config(format!(
                "server.mount_path must start with '/': {}",
                self.server.mount_path
            )));
        }
        if self.files.max_concurrent_loads == 0 {
            return Err(FileServiceError::Config(
                "files.max_concurrent_loads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            mount_path: "/".to_string(),
        }
    }
}

impl Default for FileServiceConfig {
    fn default() -> Self {
        Self {
            root: "./public".into(),
            max_cache_entries: DEFAULT_MAX_ENTRIES,
            max_cache_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            auto_index: false,
            serve_compressed_files: false,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            max_pooled_buffers: 64,
        }
    }
}
