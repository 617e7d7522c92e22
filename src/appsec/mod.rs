//! Application security subsystem.
//!
//! # Data Flow
//! ```text
//! transport delivery
//!     → worker.rs (bounded channel, single consumer)
//!     → controller.rs
//!         ASM_FEATURES → start/stop protections
//!         ASM / ASM_DD / ASM_DATA → clone manager → combine → compile
//!     → engine.rs (validate + activate compiled rules)
//!     → atomic swap of the live state
//! ```
//!
//! # Design Decisions
//! - Request processing reads the live state through `Appsec::snapshot`
//!   without locking
//! - Every failure keeps the last known-good ruleset

pub mod controller;
pub mod engine;
pub mod worker;

pub use controller::{Activation, Appsec, AppsecError, LiveState};
pub use engine::{EngineError, RuleEngine, StructuralEngine};
