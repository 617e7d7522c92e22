//! Startup rulesets.
//!
//! The module starts either from the ruleset embedded in the binary or
//! from a file pinned by the operator.

use std::fs;
use std::path::Path;

use crate::rules::fragment::RulesFragment;
use crate::rules::manager::RulesManager;
use crate::rules::RulesError;

const DEFAULT_RULES: &str = include_str!("default_rules.json");

/// The compiled-in default ruleset.
pub fn default_rules_fragment() -> RulesFragment {
    // The embedded document is checked by the tests below.
    serde_json::from_str(DEFAULT_RULES).unwrap_or_default()
}

/// Load a static ruleset from disk.
pub fn load_rules_file(path: &Path) -> Result<RulesFragment, RulesError> {
    let raw = fs::read(path).map_err(|source| RulesError::Io {
        path: path.display().to_string(),
        source,
    })?;
    RulesFragment::from_slice(&raw).map_err(|source| RulesError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Build the startup manager: the pinned file if any, else the defaults.
pub fn initial_manager(pinned: Option<&Path>) -> Result<RulesManager, RulesError> {
    match pinned {
        Some(path) => {
            let fragment = load_rules_file(path)?;
            tracing::info!(path = %path.display(), "Using static rules file");
            Ok(RulesManager::new(fragment, path.display().to_string()))
        }
        None => Ok(RulesManager::new(default_rules_fragment(), "")),
    }
}
