//! Combination of rules related remote config updates.
//!
//! # Responsibilities
//! - Turn one delivery of `ASM_DATA`, `ASM_DD` and `ASM` configs into
//!   mutations of a (cloned) `RulesManager`
//! - Produce an apply status for every config path of the delivery
//!
//! # Design Decisions
//! - Products are processed in a fixed order: data, base rules, overlays
//! - The data product never aborts the batch; a malformed data config is
//!   skipped and its error only surfaces if the batch fails
//! - A base rules protocol violation or any malformed base/overlay config
//!   aborts the whole batch. The caller must then drop the mutated manager.
//! - On success every path is acknowledged, including skipped data paths
//!   and paths of products no branch looked at. An acknowledgment means "the
//!   batch was committed", not "this exact config changed the rules".

use thiserror::Error;

use crate::remoteconfig::types::{
    set_statuses, ApplyStatus, ProductUpdate, Statuses, Updates, PRODUCT_ASM, PRODUCT_ASM_DATA,
    PRODUCT_ASM_DD,
};
use crate::rules::{default_rules_fragment, merge_data_entries, RulesFragment, RulesManager};

/// Edit name under which the merged rules data is stored.
pub const DATA_EDIT: &str = "asmdata";

/// Why a rules batch was rejected.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("could not parse config {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("more than one config switch received for ASM_DD")]
    MultipleBaseConfigs,

    #[error("more than one config removal received for ASM_DD")]
    MultipleBaseRemovals,
}

/// A rejected batch, with the statuses gathered before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CombineFailure {
    pub statuses: Statuses,
    #[source]
    pub error: CombineError,
}

/// Apply every rules update of the delivery to `manager`.
pub fn combine_rules_updates(
    manager: &mut RulesManager,
    updates: &Updates,
) -> Result<Statuses, CombineFailure> {
    let mut statuses = Statuses::new();
    for update in updates.values() {
        set_statuses(&mut statuses, update, &ApplyStatus::Unacknowledged);
    }

    if let Err(error) = apply_products(manager, updates, &mut statuses) {
        return Err(CombineFailure { statuses, error });
    }

    // Every path of a successful batch is acknowledged, including data
    // paths the merge skipped as malformed.
    for update in updates.values() {
        set_statuses(&mut statuses, update, &ApplyStatus::Acknowledged);
    }
    Ok(statuses)
}

fn apply_products(
    manager: &mut RulesManager,
    updates: &Updates,
    statuses: &mut Statuses,
) -> Result<(), CombineError> {
    for product in updates.keys() {
        if ![PRODUCT_ASM_DATA, PRODUCT_ASM_DD, PRODUCT_ASM].contains(&product.as_str()) {
            tracing::debug!(product = %product, "Ignoring unsubscribed product");
        }
    }

    if let Some(update) = non_empty(updates, PRODUCT_ASM_DATA) {
        let fragment = merge_data_update(update, statuses);
        manager.add_edit(DATA_EDIT, fragment);
    }
    if let Some(update) = non_empty(updates, PRODUCT_ASM_DD) {
        apply_base_update(manager, update, statuses)?;
    }
    if let Some(update) = non_empty(updates, PRODUCT_ASM) {
        apply_overlay_update(manager, update, statuses)?;
    }
    Ok(())
}

fn non_empty<'a>(updates: &'a Updates, product: &str) -> Option<&'a ProductUpdate> {
    updates.get(product).filter(|u| !u.is_empty())
}

/// Merge every data config of the product into a single fragment.
fn merge_data_update(update: &ProductUpdate, statuses: &mut Statuses) -> RulesFragment {
    let mut fragment = RulesFragment::default();

    for (path, raw) in update {
        let Some(raw) = raw else {
            tracing::debug!(path = %path, "Data config removed");
            continue;
        };
        match RulesFragment::from_slice(raw) {
            Ok(data) => {
                fragment.rules_data = merge_data_entries(&fragment.rules_data, &data.rules_data);
                fragment.exclusion_data =
                    merge_data_entries(&fragment.exclusion_data, &data.exclusion_data);
            }
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Could not parse data config, skipping it");
                statuses.insert(path.clone(), ApplyStatus::error(e));
            }
        }
    }
    fragment
}

/// Switch the base rules. At most one config may be active per batch.
fn apply_base_update(
    manager: &mut RulesManager,
    update: &ProductUpdate,
    statuses: &mut Statuses,
) -> Result<(), CombineError> {
    let mut removal_found = false;
    let mut switch: Option<(&String, &Vec<u8>)> = None;

    for (path, raw) in update {
        let violation = match raw {
            None if removal_found => Some(CombineError::MultipleBaseRemovals),
            Some(_) if switch.is_some() => Some(CombineError::MultipleBaseConfigs),
            None => {
                removal_found = true;
                None
            }
            Some(raw) => {
                switch = Some((path, raw));
                None
            }
        };
        if let Some(err) = violation {
            tracing::warn!(error = %err, "Rejecting base rules update");
            set_statuses(statuses, update, &ApplyStatus::error(&err));
            return Err(err);
        }
    }

    let Some((path, raw)) = switch else {
        // Only reached with a removal: nothing replaces the retracted base.
        if removal_found {
            tracing::debug!("Base rules config removed, switching back to default rules");
            manager.change_base(default_rules_fragment(), "");
            set_statuses(statuses, update, &ApplyStatus::Acknowledged);
        }
        return Ok(());
    };

    let base = RulesFragment::from_slice(raw).map_err(|source| {
        tracing::debug!(path = %path, error = %source, "Could not parse base rules");
        statuses.insert(path.clone(), ApplyStatus::error(&source));
        CombineError::Malformed {
            path: path.clone(),
            source,
        }
    })?;
    tracing::debug!(path = %path, "Switching base rules");
    manager.change_base(base, path.clone());
    statuses.insert(path.clone(), ApplyStatus::Acknowledged);
    Ok(())
}

/// Store every overlay config as its own edit.
fn apply_overlay_update(
    manager: &mut RulesManager,
    update: &ProductUpdate,
    statuses: &mut Statuses,
) -> Result<(), CombineError> {
    for (path, raw) in update {
        let Some(raw) = raw else {
            tracing::debug!(path = %path, "Overlay config removed");
            manager.remove_edit(path);
            continue;
        };
        match RulesFragment::from_slice(raw) {
            Ok(fragment) => manager.add_edit(path.clone(), fragment),
            Err(source) => {
                tracing::debug!(path = %path, error = %source, "Could not parse overlay config");
                statuses.insert(path.clone(), ApplyStatus::error(&source));
                return Err(CombineError::Malformed {
                    path: path.clone(),
                    source,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleDataEntry;

    fn updates(product: &str, configs: &[(&str, Option<&str>)]) -> Updates {
        let mut all = Updates::new();
        add(&mut all, product, configs);
        all
    }

    fn add(all: &mut Updates, product: &str, configs: &[(&str, Option<&str>)]) {
        let update = all.entry(product.to_string()).or_default();
        for (path, raw) in configs {
            update.insert(path.to_string(), raw.map(|r| r.as_bytes().to_vec()));
        }
    }

    fn manager() -> RulesManager {
        RulesManager::new(default_rules_fragment(), "")
    }

    const OVERLAY: &str = r#"{"exclusions": [{"id": "exc-1"}]}"#;
    const BASE: &str = r#"{"version": "2.2", "rules": [{"id": "remote-1"}]}"#;

    #[test]
    fn test_overlay_add_and_remove() {
        let mut m = manager();
        let statuses = combine_rules_updates(&mut m, &updates(PRODUCT_ASM, &[("a", Some(OVERLAY))])).unwrap();
        assert_eq!(statuses["a"], ApplyStatus::Acknowledged);
        assert!(m.edit("a").is_some());

        let statuses = combine_rules_updates(&mut m, &updates(PRODUCT_ASM, &[("a", None)])).unwrap();
        assert_eq!(statuses["a"], ApplyStatus::Acknowledged);
        assert!(m.edit("a").is_none());
    }

    #[test]
    fn test_malformed_overlay_aborts() {
        let mut m = manager();
        let batch = updates(PRODUCT_ASM, &[("a", Some(OVERLAY)), ("b", Some("{oops"))]);

        let failure = combine_rules_updates(&mut m, &batch).unwrap_err();
        assert!(matches!(failure.error, CombineError::Malformed { ref path, .. } if path == "b"));
        assert!(failure.statuses["b"].is_error());
        assert_eq!(failure.statuses["a"], ApplyStatus::Unacknowledged);
    }

    #[test]
    fn test_base_switch() {
        let mut m = manager();
        let statuses = combine_rules_updates(&mut m, &updates(PRODUCT_ASM_DD, &[("base1", Some(BASE))])).unwrap();
        assert_eq!(statuses["base1"], ApplyStatus::Acknowledged);
        assert_eq!(m.base_path(), "base1");
        assert_eq!(m.base().rules[0]["id"], "remote-1");
    }

    #[test]
    fn test_base_removal_reverts_to_defaults() {
        let mut m = manager();
        combine_rules_updates(&mut m, &updates(PRODUCT_ASM_DD, &[("base1", Some(BASE))])).unwrap();

        let statuses = combine_rules_updates(&mut m, &updates(PRODUCT_ASM_DD, &[("base1", None)])).unwrap();
        assert_eq!(statuses["base1"], ApplyStatus::Acknowledged);
        assert_eq!(m.base_path(), "");
        assert_eq!(m.base(), &default_rules_fragment());
    }

    #[test]
    fn test_removal_and_switch_in_same_batch() {
        let mut m = manager();
        let batch = updates(PRODUCT_ASM_DD, &[("old", None), ("new", Some(BASE))]);
        let statuses = combine_rules_updates(&mut m, &batch).unwrap();
        assert_eq!(m.base_path(), "new");
        assert_eq!(statuses["old"], ApplyStatus::Acknowledged);
        assert_eq!(statuses["new"], ApplyStatus::Acknowledged);
    }

    #[test]
    fn test_two_base_configs_rejected() {
        let mut m = manager();
        let before = m.clone();
        let batch = updates(PRODUCT_ASM_DD, &[("b1", Some(BASE)), ("b2", Some(BASE))]);

        let failure = combine_rules_updates(&mut m, &batch).unwrap_err();
        assert!(matches!(failure.error, CombineError::MultipleBaseConfigs));
        assert!(failure.statuses["b1"].is_error());
        assert!(failure.statuses["b2"].is_error());
        assert_eq!(m, before);
    }

    #[test]
    fn test_two_base_removals_rejected() {
        let mut m = manager();
        let batch = updates(PRODUCT_ASM_DD, &[("b1", None), ("b2", None)]);
        let failure = combine_rules_updates(&mut m, &batch).unwrap_err();
        assert!(matches!(failure.error, CombineError::MultipleBaseRemovals));
    }

    #[test]
    fn test_malformed_base_rejected() {
        let mut m = manager();
        let failure = combine_rules_updates(&mut m, &updates(PRODUCT_ASM_DD, &[("b1", Some("[1,"))])).unwrap_err();
        assert!(matches!(failure.error, CombineError::Malformed { .. }));
        assert!(failure.statuses["b1"].is_error());
        assert_eq!(m.base_path(), "");
    }

    #[test]
    fn test_data_configs_merged_into_one_edit() {
        let mut m = manager();
        let batch = updates(
            PRODUCT_ASM_DATA,
            &[
                ("d1", Some(r#"{"rules_data": [{"id": "blocked_ips", "type": "ip_with_expiration", "data": [{"value": "1.1.1.1", "expiration": 5}]}]}"#)),
                ("d2", Some(r#"{"rules_data": [{"id": "blocked_ips", "type": "ip_with_expiration", "data": [{"value": "1.1.1.1", "expiration": 9}, {"value": "2.2.2.2"}]}],
                               "exclusion_data": [{"id": "passlist_ips", "type": "ip_with_expiration", "data": [{"value": "10.0.0.1"}]}]}"#)),
                ("d3", None),
            ],
        );

        let statuses = combine_rules_updates(&mut m, &batch).unwrap();
        assert!(statuses.values().all(|s| *s == ApplyStatus::Acknowledged));

        let edit = m.edit(DATA_EDIT).unwrap();
        assert_eq!(edit.rules_data.len(), 1);
        assert_eq!(
            edit.rules_data[0].data,
            vec![RuleDataEntry::new("1.1.1.1", 9), RuleDataEntry::new("2.2.2.2", 0)]
        );
        assert_eq!(edit.exclusion_data.len(), 1);
    }

    #[test]
    fn test_malformed_data_is_isolated() {
        let mut m = manager();
        let mut batch = updates(
            PRODUCT_ASM_DATA,
            &[
                ("good", Some(r#"{"rules_data": [{"id": "u", "type": "data_with_expiration", "data": [{"value": "bob"}]}]}"#)),
                ("bad", Some("nope")),
            ],
        );
        add(&mut batch, PRODUCT_ASM, &[("overlay", Some(OVERLAY))]);

        let statuses = combine_rules_updates(&mut m, &batch).unwrap();
        // The malformed data path is skipped, and the batch acknowledges it anyway.
        assert_eq!(statuses["bad"], ApplyStatus::Acknowledged);
        assert_eq!(statuses["good"], ApplyStatus::Acknowledged);
        assert_eq!(statuses["overlay"], ApplyStatus::Acknowledged);
        assert_eq!(m.edit(DATA_EDIT).unwrap().rules_data.len(), 1);
        assert!(m.edit("overlay").is_some());
    }

    #[test]
    fn test_unknown_products_acknowledged_on_success() {
        let mut m = manager();
        let mut batch = updates("APM_TRACING", &[("t", Some("{}"))]);
        add(&mut batch, PRODUCT_ASM, &[("a", Some(OVERLAY))]);

        let statuses = combine_rules_updates(&mut m, &batch).unwrap();
        assert_eq!(statuses["t"], ApplyStatus::Acknowledged);
    }

    #[test]
    fn test_error_leaves_untouched_products_pending() {
        let mut m = manager();
        let mut batch = updates("APM_TRACING", &[("t", Some("{}"))]);
        add(&mut batch, PRODUCT_ASM, &[("a", Some("{bad"))]);

        let failure = combine_rules_updates(&mut m, &batch).unwrap_err();
        assert_eq!(failure.statuses["t"], ApplyStatus::Unacknowledged);
    }

    #[test]
    fn test_empty_product_skipped() {
        let mut m = manager();
        let mut batch = Updates::new();
        batch.insert(PRODUCT_ASM_DATA.to_string(), ProductUpdate::new());

        let statuses = combine_rules_updates(&mut m, &batch).unwrap();
        assert!(statuses.is_empty());
        assert!(m.edit(DATA_EDIT).is_none());
    }
}
