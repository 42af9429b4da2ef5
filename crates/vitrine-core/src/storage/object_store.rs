//! Object store trait.
//!
//! A flat namespace of named byte blobs. Names may contain `/`; prefixes are
//! plain string prefixes, not directories.

use vitrine_types::error::StoreError;

/// Trait for remote blob storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in vitrine-infra.
pub trait ObjectStore: Send + Sync {
    /// List the names of all objects starting with `prefix`.
    fn list(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Fetch an object. Returns `None` if it does not exist.
    fn get(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Store an object, replacing any existing one with the same name.
    fn put(
        &self,
        name: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete an object. No-op if it does not exist.
    fn delete(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
