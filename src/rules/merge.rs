//! Rules data merging.
//!
//! # Responsibilities
//! - Group data entries by `(id, type)`
//! - Deduplicate values inside a group
//! - Resolve duplicate values by expiration
//!
//! # Design Decisions
//! - A value that never expires (expiration 0) wins over any timestamp
//! - Otherwise the latest expiration wins
//! - Output is sorted by `(id, type)` then by value so the merge is
//!   commutative, associative and idempotent

use std::collections::BTreeMap;

use crate::rules::fragment::{DataEntry, RuleDataEntry};

/// Merge two lists of data entries into one deduplicated, sorted list.
pub fn merge_data_entries(left: &[DataEntry], right: &[DataEntry]) -> Vec<DataEntry> {
    let mut groups: BTreeMap<(String, String), BTreeMap<String, i64>> = BTreeMap::new();

    for entry in left.iter().chain(right) {
        let values = groups
            .entry((entry.id.clone(), entry.kind.clone()))
            .or_default();
        for item in &entry.data {
            insert_value(values, item);
        }
    }

    groups
        .into_iter()
        .map(|((id, kind), values)| DataEntry {
            id,
            kind,
            data: into_entries(values),
        })
        .collect()
}

fn insert_value(values: &mut BTreeMap<String, i64>, item: &RuleDataEntry) {
    values
        .entry(item.value.clone())
        .and_modify(|current| *current = merge_expiration(*current, item.expiration))
        .or_insert(item.expiration);
}

/// Expiration of a value seen twice.
pub fn merge_expiration(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        0
    } else {
        a.max(b)
    }
}

fn into_entries(values: BTreeMap<String, i64>) -> Vec<RuleDataEntry> {
    values
        .into_iter()
        .map(|(value, expiration)| RuleDataEntry { value, expiration })
        .collect()
}
