//! Remote configuration subsystem.
//!
//! # Data Flow
//! ```text
//! transport delivery {product → {path → payload | null}}
//!     → client.rs (UpdateSender → update worker)
//!     → combiner.rs (rules products → RulesManager clone + statuses)
//!     → statuses returned to the transport
//! ```

pub mod client;
pub mod combiner;
pub mod types;

pub use client::{Delivery, Listener, LocalClient, RemoteConfigClient, TransportError, UpdateSender};
pub use combiner::{combine_rules_updates, CombineError, CombineFailure, DATA_EDIT};
pub use types::{
    parse_updates, set_statuses, ApplyStatus, Capability, FeaturesData, ProductUpdate, Statuses, Updates, BLOCKING_CAPABILITIES,
    PRODUCT_ASM, PRODUCT_ASM_DATA, PRODUCT_ASM_DD, PRODUCT_ASM_FEATURES,
};
