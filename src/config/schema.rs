//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from a TOML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppsecRcConfig {
    /// Protection settings.
    pub appsec: AppsecConfig,

    /// Remote config settings.
    pub remote_config: RemoteConfigSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Protection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppsecConfig {
    /// Force protections on or off. Unset lets remote config decide.
    pub enabled: Option<bool>,

    /// Static ruleset. When set, remote config can't change the rules.
    pub rules_file: Option<PathBuf>,

    /// Advertise RASP capabilities when protections start.
    pub rasp: bool,

    /// The host instruments file access (enables the LFI capability).
    pub lfi_supported: bool,
}

impl Default for AppsecConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            rules_file: None,
            rasp: true,
            lfi_supported: false,
        }
    }
}

/// Remote config settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfigSettings {
    /// Connect the module to a remote config transport.
    pub enabled: bool,

    /// Deliveries waiting for the update worker (backpressure).
    pub channel_capacity: usize,
}

impl Default for RemoteConfigSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 32,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
