//! Object store backends for the credential mirror.
//!
//! The backend is chosen at runtime from `[storage] backend`, so the
//! concrete stores are wrapped in [`ConfiguredStore`], which itself
//! implements `ObjectStore` by delegation.

pub mod azure;
pub mod local;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use vitrine_core::storage::ObjectStore;
use vitrine_types::config::{StorageBackend, StorageConfig};
use vitrine_types::error::{ConfigError, StoreError};

use crate::filesystem::LocalFileSystem;

pub use azure::AzureBlobStore;
pub use local::DirectoryObjectStore;

/// The object store selected by configuration.
#[derive(Debug)]
pub enum ConfiguredStore {
    /// No remote copy: lists are empty and writes are dropped.
    Disabled,
    Local(DirectoryObjectStore),
    Azure(AzureBlobStore),
}

impl ConfiguredStore {
    /// Build the configured backend.
    ///
    /// A relative `local_root` resolves against `data_dir`; without one the
    /// local backend uses `{data_dir}/blobs`.
    pub fn from_config(
        config: &StorageConfig,
        data_dir: &Path,
        sas_token: Option<SecretString>,
    ) -> Result<Self, ConfigError> {
        match config.backend {
            StorageBackend::None => Ok(ConfiguredStore::Disabled),
            StorageBackend::Local => {
                let root = match &config.local_root {
                    Some(root) => LocalFileSystem::resolve(data_dir, root),
                    None => data_dir.join("blobs"),
                };
                Ok(ConfiguredStore::Local(DirectoryObjectStore::new(root)))
            }
            StorageBackend::Azure => {
                let url = config.container_url.as_deref().ok_or_else(|| {
                    ConfigError::Invalid(
                        "storage.container_url is required for the azure backend".to_string(),
                    )
                })?;
                let store = AzureBlobStore::new(
                    url,
                    sas_token,
                    Duration::from_secs(config.request_timeout_secs),
                )
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Ok(ConfiguredStore::Azure(store))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ConfiguredStore::Disabled)
    }

    /// Short backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfiguredStore::Disabled => "none",
            ConfiguredStore::Local(_) => "local",
            ConfiguredStore::Azure(_) => "azure",
        }
    }
}

impl ObjectStore for ConfiguredStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            ConfiguredStore::Disabled => Ok(Vec::new()),
            ConfiguredStore::Local(store) => store.list(prefix).await,
            ConfiguredStore::Azure(store) => store.list(prefix).await,
        }
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            ConfiguredStore::Disabled => Ok(None),
            ConfiguredStore::Local(store) => store.get(name).await,
            ConfiguredStore::Azure(store) => store.get(name).await,
        }
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Disabled => Ok(()),
            ConfiguredStore::Local(store) => store.put(name, data).await,
            ConfiguredStore::Azure(store) => store.put(name, data).await,
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Disabled => Ok(()),
            ConfiguredStore::Local(store) => store.delete(name).await,
            ConfiguredStore::Azure(store) => store.delete(name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test]
    async fn disabled_store_is_inert() {
        let store = ConfiguredStore::from_config(
            &StorageConfig::default(),
            Path::new("/tmp/vitrine"),
            None,
        )
        .unwrap();

        assert!(!store.is_enabled());
        store.put("auth/creds.json", b"x").await.unwrap();
        assert!(store.list("auth/").await.unwrap().is_empty());
        assert!(store.get("auth/creds.json").await.unwrap().is_none());
    }

    #[test]
    fn local_backend_resolves_root_against_data_dir() {
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_root: Some(PathBuf::from("mirror")),
            ..StorageConfig::default()
        };
        let store = ConfiguredStore::from_config(&config, Path::new("/data"), None).unwrap();
        match store {
            ConfiguredStore::Local(local) => assert_eq!(local.root(), Path::new("/data/mirror")),
            other => panic!("unexpected backend {}", other.kind()),
        }

        let config = StorageConfig {
            backend: StorageBackend::Local,
            ..StorageConfig::default()
        };
        let store = ConfiguredStore::from_config(&config, Path::new("/data"), None).unwrap();
        assert_eq!(store.kind(), "local");
    }

    #[test]
    fn azure_backend_requires_container_url() {
        let config = StorageConfig {
            backend: StorageBackend::Azure,
            ..StorageConfig::default()
        };
        assert!(ConfiguredStore::from_config(&config, Path::new("/data"), None).is_err());

        let config = StorageConfig {
            backend: StorageBackend::Azure,
            container_url: Some("https://acct.blob.core.windows.net/sessions".to_string()),
            ..StorageConfig::default()
        };
        let store = ConfiguredStore::from_config(&config, Path::new("/data"), None).unwrap();
        assert_eq!(store.kind(), "azure");
    }
}
