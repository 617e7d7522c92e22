//! Remote config driven security rules management.
//!
//! Receives asynchronous, multi-product remote config deliveries and turns
//! them into one consistent ruleset for a runtime protection engine,
//! without ever leaving the engine on an invalid or partially applied
//! ruleset.

pub mod appsec;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod remoteconfig;
pub mod rules;

pub use appsec::{Appsec, LiveState, RuleEngine};
pub use config::AppsecRcConfig;
pub use lifecycle::Shutdown;
pub use remoteconfig::{ApplyStatus, LocalClient, RemoteConfigClient, Updates};
pub use rules::{CompiledRules, RulesManager};
