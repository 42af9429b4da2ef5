//! Configuration types for Vitrine.
//!
//! `VitrineConfig` mirrors `vitrine.toml`. Every field has a default so an
//! empty (or missing) file yields a runnable configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitrineConfig {
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub readiness: ReadinessConfig,
    pub storage: StorageConfig,
    pub bridge: BridgeConfig,
    pub http: HttpConfig,
    pub commands: CommandsConfig,
}

/// Identity of the linked device and where its credentials live locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Label announced to the protocol for the linked device.
    pub device_label: String,
    /// Local credential directory. Relative paths resolve against the data dir.
    pub auth_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_label: "vitrine".to_string(),
            auth_dir: PathBuf::from("auth"),
        }
    }
}

/// Backoff policy for transient closures.
///
/// `delay = min(base_delay * growth_factor^(attempt-1), max_delay)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts tolerated before the process gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            growth_factor: 1.5,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

/// Group warm-up throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Minimum time between two warm-up attempts for the same group.
    pub cooldown_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { cooldown_secs: 60 }
    }
}

/// Which remote object store mirrors the credential set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Credentials stay on local disk only.
    #[default]
    None,
    /// A local directory posing as an object store.
    Local,
    /// Azure Blob Storage container addressed with a SAS token.
    Azure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Container URL, e.g. `https://acct.blob.core.windows.net/sessions`.
    pub container_url: Option<String>,
    /// Root directory for the `local` backend.
    pub local_root: Option<PathBuf>,
    /// Object name prefix under which the credential files are mirrored.
    pub prefix: String,
    /// Delete the remote copy as well when the device is logged out.
    pub purge_remote_on_logout: bool,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::None,
            container_url: None,
            local_root: None,
            prefix: "auth".to_string(),
            purge_remote_on_logout: true,
            request_timeout_secs: 30,
        }
    }
}

/// The protocol sidecar process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// How long a send waits for the sidecar's acknowledgement.
    pub send_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: "vitrine-bridge".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            send_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// How inbound messages are handed to the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each message is fully processed before the next one starts.
    #[default]
    Sequential,
    /// Messages are processed by a bounded pool of tasks.
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Endpoint that implements the business commands.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
    pub dispatch: DispatchMode,
    /// Worker pool size for concurrent dispatch.
    pub workers: usize,
    /// Reply sent when a handler fails.
    pub error_reply: String,
    /// Forward every message to the anti-abuse scan.
    pub abuse_scan: bool,
    /// Forward group images to the receipt handler.
    pub receipt_images: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 30,
            dispatch: DispatchMode::Sequential,
            workers: 4,
            error_reply: "Desculpe, ocorreu um erro ao processar seu comando. Tente novamente."
                .to_string(),
            abuse_scan: true,
            receipt_images: true,
        }
    }
}
