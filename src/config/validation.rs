//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (channel capacity > 0)
//! - Check the pinned rules file exists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppsecRcConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::AppsecRcConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("remote_config.channel_capacity must be greater than 0")]
    ZeroChannelCapacity,

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),

    #[error("rules file {0} does not exist")]
    MissingRulesFile(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &AppsecRcConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.remote_config.channel_capacity == 0 {
        errors.push(ValidationError::ZeroChannelCapacity);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }

    if let Some(path) = &config.appsec.rules_file {
        if !path.is_file() {
            errors.push(ValidationError::MissingRulesFile(path.display().to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
