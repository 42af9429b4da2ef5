//! Application wiring.
//!
//! [`AppContext`] holds the loaded configuration and builds the concrete
//! infra implementations the commands need. [`AppState`] is the slice the
//! HTTP handlers see.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use vitrine_core::storage::CredentialBridge;
use vitrine_infra::blob::ConfiguredStore;
use vitrine_infra::config::{RuntimeSecrets, apply_env_overrides, load_config, validate};
use vitrine_infra::filesystem::{LocalFileSystem, resolve_data_dir};
use vitrine_types::config::VitrineConfig;
use vitrine_types::session::StatusSnapshot;

/// Credential bridge pinned to the infra implementations.
pub type ConcreteCredentialBridge = CredentialBridge<ConfiguredStore, LocalFileSystem>;

pub struct AppContext {
    pub config: VitrineConfig,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub secrets: RuntimeSecrets,
}

impl AppContext {
    /// Resolve the data directory, load and validate the configuration.
    pub async fn init(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config_path = config_path.unwrap_or_else(|| LocalFileSystem::config_path(&data_dir));
        let mut config = load_config(&config_path).await?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        validate(&config)?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            config = %config_path.display(),
            "configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
            data_dir,
            secrets: RuntimeSecrets::from_env(),
        })
    }

    /// Local credential directory.
    pub fn auth_dir(&self) -> PathBuf {
        LocalFileSystem::resolve(&self.data_dir, &self.config.session.auth_dir)
    }

    pub fn credential_bridge(&self) -> anyhow::Result<ConcreteCredentialBridge> {
        let store = ConfiguredStore::from_config(
            &self.config.storage,
            &self.data_dir,
            self.secrets.storage_sas_token.clone(),
        )?;
        Ok(CredentialBridge::new(
            store,
            LocalFileSystem::new(),
            self.auth_dir(),
            self.config.storage.prefix.clone(),
        ))
    }
}

/// State shared with the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub status: watch::Receiver<StatusSnapshot>,
    pub device_label: Arc<str>,
}

impl AppState {
    pub fn new(status: watch::Receiver<StatusSnapshot>, device_label: impl Into<Arc<str>>) -> Self {
        Self {
            status,
            device_label: device_label.into(),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}
