//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::AppsecRcConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Pins a static ruleset and disables remote rules negotiation.
pub const ENV_RULES: &str = "APPSEC_RULES";
/// Forces protections on or off.
pub const ENV_ENABLED: &str = "APPSEC_ENABLED";
pub const ENV_RASP_ENABLED: &str = "APPSEC_RASP_ENABLED";
pub const ENV_REMOTE_CONFIG_ENABLED: &str = "APPSEC_REMOTE_CONFIG_ENABLED";

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: file (or defaults), then environment, then validate.
pub fn load_config(path: Option<&Path>) -> Result<AppsecRcConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppsecRcConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides read through `lookup`.
///
/// Unparseable booleans are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut AppsecRcConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_RULES).filter(|p| !p.is_empty()) {
        config.appsec.rules_file = Some(PathBuf::from(path));
    }
    if let Some(enabled) = lookup_bool(&lookup, ENV_ENABLED) {
        config.appsec.enabled = Some(enabled);
    }
    if let Some(rasp) = lookup_bool(&lookup, ENV_RASP_ENABLED) {
        config.appsec.rasp = rasp;
    }
    if let Some(rc) = lookup_bool(&lookup, ENV_REMOTE_CONFIG_ENABLED) {
        config.remote_config.enabled = rc;
    }
}

fn lookup_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid boolean environment value");
            None
        }
    }
}
