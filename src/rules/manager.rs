//! Versioned rules container.
//!
//! # Responsibilities
//! - Hold the base ruleset and its provenance path
//! - Hold named overlay edits
//! - Compile base + edits into the artifact handed to the rule engine
//!
//! # Design Decisions
//! - Edits live in a `BTreeMap` so compile order is the edit name order
//! - `compile` is a pure function of `base` and `edits`
//! - Managers are never mutated once published: updates work on a clone

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::rules::fragment::RulesFragment;
use crate::rules::merge::merge_data_entries;

/// Base ruleset plus named overlay edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RulesManager {
    base: RulesFragment,
    /// Where the base came from: a remote config path, a file, or empty
    /// for the compiled-in defaults.
    base_path: String,
    edits: BTreeMap<String, RulesFragment>,
}

impl RulesManager {
    /// Create a manager over the given base and no edits.
    pub fn new(base: RulesFragment, base_path: impl Into<String>) -> Self {
        Self {
            base,
            base_path: base_path.into(),
            edits: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &RulesFragment {
        &self.base
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn edits(&self) -> &BTreeMap<String, RulesFragment> {
        &self.edits
    }

    pub fn edit(&self, name: &str) -> Option<&RulesFragment> {
        self.edits.get(name)
    }

    /// Insert or replace an edit.
    pub fn add_edit(&mut self, name: impl Into<String>, fragment: RulesFragment) {
        self.edits.insert(name.into(), fragment);
    }

    /// Remove an edit. Unknown names are ignored.
    pub fn remove_edit(&mut self, name: &str) {
        self.edits.remove(name);
    }

    /// Replace the base ruleset.
    pub fn change_base(&mut self, fragment: RulesFragment, path: impl Into<String>) {
        self.base = fragment;
        self.base_path = path.into();
    }

    /// Resolve base and edits into a single ruleset.
    pub fn compile(&self) -> CompiledRules {
        let mut rules = self.base.clone();
        for edit in self.edits.values() {
            rules.append(edit);
        }
        // Several edits may carry the same data set, collapse them.
        rules.rules_data = merge_data_entries(&rules.rules_data, &[]);
        rules.exclusion_data = merge_data_entries(&rules.exclusion_data, &[]);

        CompiledRules {
            base_path: self.base_path.clone(),
            edits: self.edits.keys().cloned().collect(),
            rules,
        }
    }
}

/// The resolved ruleset, ready for the rule engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledRules {
    base_path: String,
    edits: Vec<String>,
    rules: RulesFragment,
}

impl CompiledRules {
    /// The merged rule document.
    pub fn rules(&self) -> &RulesFragment {
        &self.rules
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Names of the edits that went into this artifact, in compile order.
    pub fn edits(&self) -> &[String] {
        &self.edits
    }
}

impl fmt::Display for CompiledRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.rules) {
            Ok(doc) => write!(f, "{}", doc),
            Err(_) => write!(f, "<unserializable rules from {:?}>", self.base_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fragment::{DataEntry, RuleDataEntry};
    use serde_json::json;

    fn base() -> RulesFragment {
        RulesFragment {
            version: Some("2.2".into()),
            rules: vec![json!({"id": "base-001"})],
            ..Default::default()
        }
    }

    fn edit_with_rule(id: &str) -> RulesFragment {
        RulesFragment {
            custom_rules: vec![json!({"id": id})],
            ..Default::default()
        }
    }

    #[test]
    fn test_edits_upsert_and_remove() {
        let mut manager = RulesManager::new(base(), "");
        manager.add_edit("a", edit_with_rule("c1"));
        manager.add_edit("a", edit_with_rule("c2"));
        assert_eq!(manager.edits().len(), 1);
        assert_eq!(manager.edit("a").unwrap().custom_rules[0]["id"], "c2");

        manager.remove_edit("a");
        manager.remove_edit("missing");
        assert!(manager.edits().is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = RulesManager::new(base(), "");
        let mut copy = original.clone();
        copy.add_edit("x", edit_with_rule("c1"));
        copy.change_base(RulesFragment::default(), "remote/path");

        assert!(original.edits().is_empty());
        assert_eq!(original.base_path(), "");
        assert_eq!(original.base(), &base());
    }

    #[test]
    fn test_compile_orders_edits_by_name() {
        let mut manager = RulesManager::new(base(), "base/path");
        manager.add_edit("z", edit_with_rule("from-z"));
        manager.add_edit("a", edit_with_rule("from-a"));

        let compiled = manager.compile();
        assert_eq!(compiled.edits(), &["a".to_string(), "z".to_string()]);
        assert_eq!(compiled.base_path(), "base/path");
        let ids: Vec<_> = compiled.rules().custom_rules.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("from-a"), json!("from-z")]);
        assert_eq!(compiled.rules().rules.len(), 1);
        assert_eq!(compiled.rules().version.as_deref(), Some("2.2"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let mut first = RulesManager::new(base(), "");
        first.add_edit("b", edit_with_rule("b"));
        first.add_edit("a", edit_with_rule("a"));

        let mut second = RulesManager::new(base(), "");
        second.add_edit("a", edit_with_rule("a"));
        second.add_edit("b", edit_with_rule("b"));

        assert_eq!(first.compile(), second.compile());
        assert_eq!(first.compile().to_string(), second.compile().to_string());
    }

    #[test]
    fn test_compile_merges_data_across_edits() {
        let data = |exp| RulesFragment {
            rules_data: vec![DataEntry {
                id: "x".into(),
                kind: "ip".into(),
                data: vec![RuleDataEntry::new("1.2.3.4", exp)],
            }],
            ..Default::default()
        };
        let mut manager = RulesManager::new(base(), "");
        manager.add_edit("a", data(0));
        manager.add_edit("b", data(1000));

        let compiled = manager.compile();
        assert_eq!(compiled.rules().rules_data.len(), 1);
        assert_eq!(compiled.rules().rules_data[0].data, vec![RuleDataEntry::new("1.2.3.4", 0)]);
    }

    #[test]
    fn test_display_renders_document() {
        let compiled = RulesManager::new(base(), "").compile();
        let rendered = compiled.to_string();
        assert!(rendered.contains("base-001"));
        assert!(rendered.contains("\"version\":\"2.2\""));
    }
}
