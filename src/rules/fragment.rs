//! Rule document schema.
//!
//! This module defines the JSON shape of a rules fragment as delivered by
//! remote config or loaded from disk. Rule bodies are kept as opaque JSON
//! values: only the rules data entries are interpreted by this crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A piece of a security ruleset.
///
/// A fragment is either the base ruleset or an overlay edit. Every
/// list-valued field is appended to the base at compile time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Value>,

    #[serde(rename = "rules_override", skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scanners: Vec<Value>,

    /// Data consumed by rules (IP/user block lists, ...).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules_data: Vec<DataEntry>,

    /// Data consumed by exclusion filters.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusion_data: Vec<DataEntry>,
}

impl RulesFragment {
    /// Parse a fragment from a raw remote config payload.
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Append every list of `other` to this fragment.
    ///
    /// `version` and `metadata` are left untouched: they always describe the base.
    pub fn append(&mut self, other: &RulesFragment) {
        self.rules.extend_from_slice(&other.rules);
        self.overrides.extend_from_slice(&other.overrides);
        self.exclusions.extend_from_slice(&other.exclusions);
        self.actions.extend_from_slice(&other.actions);
        self.custom_rules.extend_from_slice(&other.custom_rules);
        self.processors.extend_from_slice(&other.processors);
        self.scanners.extend_from_slice(&other.scanners);
        self.rules_data.extend_from_slice(&other.rules_data);
        self.exclusion_data.extend_from_slice(&other.exclusion_data);
    }
}

/// A named data set referenced by rules, e.g. a list of blocked IPs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<RuleDataEntry>,
}

/// A single value of a data set.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct RuleDataEntry {
    pub value: String,
    /// Unix timestamp in seconds; 0 means the value never expires.
    #[serde(default)]
    pub expiration: i64,
}

impl RuleDataEntry {
    pub fn new(value: impl Into<String>, expiration: i64) -> Self {
        Self {
            value: value.into(),
            expiration,
        }
    }
}
