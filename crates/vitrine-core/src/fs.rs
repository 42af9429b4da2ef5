//! FileSystem trait for abstracting file I/O.
//!
//! The credential bridge reads and writes the local credential directory
//! through this trait. The `LocalFileSystem` adapter lives in vitrine-infra.

use std::path::Path;

/// Abstraction over the handful of filesystem operations the credential
/// bridge needs.
pub trait FileSystem: Send + Sync {
    /// List the names of the regular files directly inside `dir`.
    ///
    /// A missing directory yields an empty list.
    fn list_files(
        &self,
        dir: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<String>, std::io::Error>> + Send;

    /// Read a file's raw bytes.
    fn read_bytes(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, std::io::Error>> + Send;

    /// Write raw bytes to a file, creating parent directories as needed.
    fn write_bytes(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), std::io::Error>> + Send;

    /// Check whether a path exists.
    fn exists(&self, path: &Path) -> impl std::future::Future<Output = bool> + Send;

    /// Remove a directory and all its contents.
    fn remove_dir_all(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<(), std::io::Error>> + Send;
}
