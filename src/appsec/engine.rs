//! Rule engine seam.
//!
//! # Responsibilities
//! - Describe how compiled rules reach the evaluation engine
//! - Provide a structural validator used when no native engine is attached
//!
//! # Design Decisions
//! - The engine validates a ruleset before activating it; a rejected
//!   update leaves the previous ruleset active
//! - Engines are shared behind `Arc` and must be `Send + Sync`

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use thiserror::Error;

use crate::rules::CompiledRules;

/// Errors reported by a rule engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The ruleset was refused.
    #[error("invalid rules: {0}")]
    InvalidRules(String),

    /// An update was attempted while the engine is stopped.
    #[error("rule engine is not running")]
    NotRunning,
}

/// The evaluation engine consuming compiled rules.
pub trait RuleEngine: Send + Sync {
    /// Start evaluating requests against `rules`.
    fn start(&self, rules: &CompiledRules) -> Result<(), EngineError>;

    /// Replace the active rules. On error the previous rules stay active.
    fn update(&self, rules: &CompiledRules) -> Result<(), EngineError>;

    /// Stop evaluating requests.
    fn stop(&self);
}

/// Engine that only checks the shape of a ruleset.
///
/// Every rule and custom rule must be an object with a non-empty string
/// `id`, and ids must be unique across both lists.
#[derive(Debug, Default)]
pub struct StructuralEngine {
    running: AtomicBool,
}

impl StructuralEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Check rule ids of a compiled ruleset.
pub fn validate_rules(rules: &CompiledRules) -> Result<(), EngineError> {
    let doc = rules.rules();
    let mut seen = HashSet::new();

    for rule in doc.rules.iter().chain(&doc.custom_rules) {
        let id = rule
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::InvalidRules(format!("rule without id: {}", rule)))?;
        if !seen.insert(id) {
            return Err(EngineError::InvalidRules(format!("duplicate rule id {}", id)));
        }
    }
    Ok(())
}

impl RuleEngine for StructuralEngine {
    fn start(&self, rules: &CompiledRules) -> Result<(), EngineError> {
        validate_rules(rules)?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn update(&self, rules: &CompiledRules) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        validate_rules(rules)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
