//! Configuration loader for Vitrine.
//!
//! Reads `vitrine.toml` (by default from the data directory) into
//! [`VitrineConfig`], then applies environment overrides. A missing file
//! yields the defaults. Unlike a missing file, a malformed one is an error:
//! running with silently dropped storage settings would lose credentials.

use std::path::Path;

use secrecy::SecretString;
use vitrine_types::config::{StorageBackend, VitrineConfig};
use vitrine_types::error::ConfigError;

/// Environment variable overriding `[http] port`.
pub const PORT_ENV: &str = "PORT";
/// SAS token for the Azure backend.
pub const STORAGE_SAS_TOKEN_ENV: &str = "VITRINE_STORAGE_SAS_TOKEN";
/// Shared secret used to sign webhook requests.
pub const WEBHOOK_SECRET_ENV: &str = "VITRINE_WEBHOOK_SECRET";

/// Load configuration from `path`.
pub async fn load_config(path: &Path) -> Result<VitrineConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(VitrineConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    toml::from_str::<VitrineConfig>(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Apply environment overrides. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(
    config: &mut VitrineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(port) = lookup(PORT_ENV) {
        config.http.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV} is not a port number: {port}")))?;
    }
    Ok(())
}

/// Check cross-field constraints serde cannot express.
pub fn validate(config: &VitrineConfig) -> Result<(), ConfigError> {
    let reconnect = &config.reconnect;
    if !reconnect.growth_factor.is_finite() || reconnect.growth_factor <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "reconnect.growth_factor must be a positive number, got {}",
            reconnect.growth_factor
        )));
    }
    if reconnect.base_delay_ms > reconnect.max_delay_ms {
        return Err(ConfigError::Invalid(
            "reconnect.base_delay_ms must not exceed reconnect.max_delay_ms".to_string(),
        ));
    }
    if config.storage.backend == StorageBackend::Azure && config.storage.container_url.is_none() {
        return Err(ConfigError::Invalid(
            "storage.container_url is required for the azure backend".to_string(),
        ));
    }
    if config.commands.workers == 0 {
        return Err(ConfigError::Invalid(
            "commands.workers must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Secrets that never live in the config file.
#[derive(Debug, Default)]
pub struct RuntimeSecrets {
    pub storage_sas_token: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
}

impl RuntimeSecrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from)
        };
        Self {
            storage_sas_token: secret(STORAGE_SAS_TOKEN_ENV),
            webhook_secret: secret(WEBHOOK_SECRET_ENV),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("vitrine.toml")).await.unwrap();
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vitrine.toml");
        tokio::fs::write(
            &path,
            r#"
[session]
device_label = "loja-centro"

[storage]
backend = "azure"
container_url = "https://acct.blob.core.windows.net/sessions"
purge_remote_on_logout = false

[bridge]
command = "node"
args = ["bridge.js"]
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.session.device_label, "loja-centro");
        assert_eq!(config.storage.backend, StorageBackend::Azure);
        assert!(!config.storage.purge_remote_on_logout);
        assert_eq!(config.bridge.args, vec!["bridge.js"]);
        validate(&config).unwrap();
    }

    #[tokio::test]
    async fn malformed_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vitrine.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        assert!(matches!(
            load_config(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn port_env_overrides_file() {
        let mut config = VitrineConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", "10000")])).unwrap();
        assert_eq!(config.http.port, 10_000);

        assert!(apply_env_overrides(&mut config, env(&[("PORT", "http")])).is_err());
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config.http.port, 10_000);
    }

    #[test]
    fn validate_rejects_inconsistent_settings() {
        let mut config = VitrineConfig::default();
        config.storage.backend = StorageBackend::Azure;
        assert!(validate(&config).is_err());

        let mut config = VitrineConfig::default();
        config.reconnect.base_delay_ms = 60_000;
        assert!(validate(&config).is_err());

        let mut config = VitrineConfig::default();
        config.commands.workers = 0;
        assert!(validate(&config).is_err());

        validate(&VitrineConfig::default()).unwrap();
    }

    #[test]
    fn secrets_come_from_env_and_ignore_blanks() {
        let secrets = RuntimeSecrets::from_lookup(env(&[
            (STORAGE_SAS_TOKEN_ENV, "sv=2024&sig=abc"),
            (WEBHOOK_SECRET_ENV, "  "),
        ]));
        assert_eq!(
            secrets.storage_sas_token.unwrap().expose_secret(),
            "sv=2024&sig=abc"
        );
        assert!(secrets.webhook_secret.is_none());
    }
}
