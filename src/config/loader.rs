//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides `encrypted_api.secret1`.
pub const SECRET1_ENV: &str = "ENCRYPTED_API_SECRET1";
/// Overrides `encrypted_api.secret2`.
pub const SECRET2_ENV: &str = "ENCRYPTED_API_SECRET2";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load, apply environment overrides and validate a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ClientConfig = toml::from_str(&content)?;
    finalize(config)
}

/// Defaults plus environment overrides, validated.
pub fn load_from_env() -> Result<ClientConfig, ConfigError> {
    finalize(ClientConfig::default())
}

fn finalize(mut config: ClientConfig) -> Result<ClientConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(
        base_url = ?config.base_url,
        secrets = config.encrypted_api.secret1.is_some() && config.encrypted_api.secret2.is_some(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Secrets from the environment win over file values.
pub fn apply_env_overrides(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(secret) = lookup(SECRET1_ENV) {
        config.encrypted_api.secret1 = Some(secret);
    }
    if let Some(secret) = lookup(SECRET2_ENV) {
        config.encrypted_api.secret2 = Some(secret);
    }
}
