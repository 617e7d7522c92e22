//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! controller / combiner / worker produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges through the `metrics` facade)
//!
//! Consumers:
//!     → tracing subscriber installed by the binary
//!     → whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a metrics recorder; without one every
//!   update is a no-op

pub mod logging;
pub mod metrics;
