//! Remote config transport seam.
//!
//! # Responsibilities
//! - Describe what this crate needs from a remote config transport
//!   (products, capabilities, listeners)
//! - Provide the handle a transport uses to hand a delivery to the
//!   update worker and wait for its statuses
//! - Provide an in-process transport used by the CLI and tests
//!
//! # Design Decisions
//! - Deliveries go through a bounded channel to a single consumer, so
//!   callers on any thread never apply updates concurrently
//! - Registration calls are idempotent

use std::collections::BTreeSet;

use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::remoteconfig::types::{
    Capability, Statuses, Updates, PRODUCT_ASM, PRODUCT_ASM_DATA, PRODUCT_ASM_DD,
    PRODUCT_ASM_FEATURES,
};

/// Transport level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No remote config client was configured.
    #[error("no valid remote configuration client")]
    NotConfigured,

    /// The update worker is gone.
    #[error("update channel closed")]
    Closed,

    /// The transport refused a registration.
    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// Which update handler a delivery is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Listener {
    /// Feature activation (`ASM_FEATURES`).
    Activation,
    /// Rules updates (`ASM`, `ASM_DD`, `ASM_DATA`).
    RulesUpdate,
}

impl Listener {
    pub const ALL: [Listener; 2] = [Listener::Activation, Listener::RulesUpdate];

    /// Products this listener consumes.
    pub fn products(self) -> &'static [&'static str] {
        match self {
            Listener::Activation => &[PRODUCT_ASM_FEATURES],
            Listener::RulesUpdate => &[PRODUCT_ASM, PRODUCT_ASM_DD, PRODUCT_ASM_DATA],
        }
    }
}

/// A delivery waiting to be applied.
#[derive(Debug)]
pub struct Delivery {
    pub listener: Listener,
    pub updates: Updates,
    pub reply: oneshot::Sender<Statuses>,
}

/// Handle used by a transport to submit deliveries.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Delivery>,
}

impl UpdateSender {
    pub fn new(tx: mpsc::Sender<Delivery>) -> Self {
        Self { tx }
    }

    /// Submit a delivery and wait for its statuses.
    pub async fn deliver(&self, listener: Listener, updates: Updates) -> Result<Statuses, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Delivery { listener, updates, reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    /// Same as `deliver`, for transports running on plain threads.
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_deliver(&self, listener: Listener, updates: Updates) -> Result<Statuses, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(Delivery { listener, updates, reply })
            .map_err(|_| TransportError::Closed)?;
        rx.blocking_recv().map_err(|_| TransportError::Closed)
    }
}

/// What the module needs from a remote config transport.
pub trait RemoteConfigClient: Send + Sync {
    /// Subscribe to a product.
    fn register_product(&self, product: &str) -> Result<(), TransportError>;

    /// Advertise a capability.
    fn register_capability(&self, capability: Capability) -> Result<(), TransportError>;

    /// Stop advertising a capability.
    fn unregister_capability(&self, capability: Capability) -> Result<(), TransportError>;

    /// Route deliveries for `listener` to `sender`.
    fn register_listener(&self, listener: Listener, sender: UpdateSender) -> Result<(), TransportError>;

    /// Stop routing deliveries for `listener`.
    fn unregister_listener(&self, listener: Listener) -> Result<(), TransportError>;
}

/// In-process transport.
///
/// Deliveries are published by hand with [`LocalClient::publish`].
#[derive(Debug, Default)]
pub struct LocalClient {
    products: DashSet<String>,
    capabilities: DashSet<Capability>,
    listeners: DashMap<Listener, UpdateSender>,
    rejected: DashSet<Capability>,
}

impl LocalClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future registration of `capability` fail.
    pub fn reject_capability(&self, capability: Capability) {
        self.rejected.insert(capability);
    }

    pub fn products(&self) -> BTreeSet<String> {
        self.products.iter().map(|p| p.key().clone()).collect()
    }

    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.iter().map(|c| *c.key()).collect()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_listener(&self, listener: Listener) -> bool {
        self.listeners.contains_key(&listener)
    }

    /// Capability bitmask as advertised on the wire.
    pub fn capabilities_mask(&self) -> u64 {
        self.capabilities
            .iter()
            .fold(0u64, |mask, c| mask | (1u64 << c.key().bit()))
    }

    /// Hand a delivery to every listener subscribed to its products.
    ///
    /// Products nobody registered are dropped. Statuses of all listeners
    /// are merged into one map.
    pub async fn publish(&self, updates: &Updates) -> Result<Statuses, TransportError> {
        let mut statuses = Statuses::new();

        for listener in Listener::ALL {
            // Clone the sender so no map guard is held across the await.
            let Some(sender) = self.listeners.get(&listener).map(|s| s.value().clone()) else {
                continue;
            };
            let routed: Updates = updates
                .iter()
                .filter(|(product, _)| {
                    listener.products().contains(&product.as_str()) && self.products.contains(*product)
                })
                .map(|(product, update)| (product.clone(), update.clone()))
                .collect();
            if routed.is_empty() {
                continue;
            }
            statuses.extend(sender.deliver(listener, routed).await?);
        }
        Ok(statuses)
    }
}

impl RemoteConfigClient for LocalClient {
    fn register_product(&self, product: &str) -> Result<(), TransportError> {
        self.products.insert(product.to_string());
        Ok(())
    }

    fn register_capability(&self, capability: Capability) -> Result<(), TransportError> {
        if self.rejected.contains(&capability) {
            return Err(TransportError::Rejected(capability.to_string()));
        }
        self.capabilities.insert(capability);
        Ok(())
    }

    fn unregister_capability(&self, capability: Capability) -> Result<(), TransportError> {
        self.capabilities.remove(&capability);
        Ok(())
    }

    fn register_listener(&self, listener: Listener, sender: UpdateSender) -> Result<(), TransportError> {
        self.listeners.insert(listener, sender);
        Ok(())
    }

    fn unregister_listener(&self, listener: Listener) -> Result<(), TransportError> {
        self.listeners.remove(&listener);
        Ok(())
    }
}
