//! Metrics collection.
//!
//! # Metrics
//! - `appsec_rc_batches_total` (counter): deliveries by listener and outcome
//! - `appsec_rc_ruleset_generation` (gauge): generation of the live state
//! - `appsec_rc_capability_errors_total` (counter): failed (un)registrations
//!
//! # Design Decisions
//! - Label values are static strings, no per-path cardinality

/// Count a processed delivery.
pub fn record_batch(listener: &'static str, outcome: &'static str) {
    ::metrics::counter!("appsec_rc_batches_total", "listener" => listener, "outcome" => outcome).increment(1);
}

/// Record the generation of the newly published live state.
pub fn record_generation(generation: u64) {
    ::metrics::gauge!("appsec_rc_ruleset_generation").set(generation as f64);
}

/// Count a capability registration failure.
pub fn record_capability_error(operation: &'static str) {
    ::metrics::counter!("appsec_rc_capability_errors_total", "operation" => operation).increment(1);
}
