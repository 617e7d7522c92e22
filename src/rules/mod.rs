//! Security rules subsystem.
//!
//! # Data Flow
//! ```text
//! default_rules.json / pinned rules file
//!     → defaults.rs (startup base fragment)
//!     → manager.rs (base + named edits)
//!     → merge.rs (rules data deduplication)
//!     → CompiledRules (handed to the rule engine)
//! ```
//!
//! # Design Decisions
//! - Rule bodies stay opaque JSON; only rules data is interpreted
//! - Compilation is deterministic (edits ordered by name)

pub mod defaults;
pub mod fragment;
pub mod manager;
pub mod merge;

use thiserror::Error;

pub use defaults::{default_rules_fragment, initial_manager};
pub use fragment::{DataEntry, RuleDataEntry, RulesFragment};
pub use manager::{CompiledRules, RulesManager};
pub use merge::merge_data_entries;

/// Errors loading a static ruleset.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("could not read rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse rules file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
