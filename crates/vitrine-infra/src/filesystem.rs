//! Filesystem adapter for Vitrine.
//!
//! Implements the `FileSystem` trait from `vitrine-core` over `tokio::fs`,
//! plus the data directory layout helpers.

use std::path::{Path, PathBuf};

use vitrine_core::fs::FileSystem;

/// Local filesystem implementation of the `FileSystem` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Default config file: `{data_dir}/vitrine.toml`.
    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("vitrine.toml")
    }

    /// Resolve a configured path against the data directory. Absolute paths
    /// are kept as they are.
    pub fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

impl FileSystem for LocalFileSystem {
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>, std::io::Error> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, std::io::Error> {
        tokio::fs::read(path).await
    }

    async fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), std::io::Error> {
        tokio::fs::remove_dir_all(path).await
    }
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `VITRINE_DATA_DIR` environment variable
/// 2. `~/.vitrine`
/// 3. `./.vitrine`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VITRINE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".vitrine");
    }

    PathBuf::from(".vitrine")
}
