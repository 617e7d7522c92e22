//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (APPSEC_RULES, APPSEC_ENABLED, ...)
//!     → validation.rs (semantic checks)
//!     → AppsecRcConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AppsecRcConfig;
pub use schema::AppsecConfig;
pub use schema::ObservabilityConfig;
pub use schema::RemoteConfigSettings;
