//! Protection lifecycle and live ruleset publication.
//!
//! # Responsibilities
//! - Start and stop protections (locally or through remote activation)
//! - Register and unregister remote config products, capabilities and
//!   listeners
//! - Apply rules updates to a private clone, compile it and swap it in
//!
//! # Design Decisions
//! - The live state (activation + manager + compiled rules) is one value
//!   behind an `ArcSwap`: readers never lock and never see a torn state
//! - All writers go through a single writer section
//! - A rejected update never touches the live state
//! - Rules updates abort on the first error; activation configs fail per
//!   path. Both granularities are kept as-is.
//! - A pinned static ruleset disables every blocking capability: remote
//!   config must not overwrite an operator supplied ruleset

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::appsec::engine::{EngineError, RuleEngine};
use crate::config::AppsecConfig;
use crate::observability::metrics;
use crate::remoteconfig::{
    combine_rules_updates, set_statuses, ApplyStatus, Capability, FeaturesData, Listener,
    ProductUpdate, RemoteConfigClient, Statuses, TransportError, UpdateSender, Updates,
    BLOCKING_CAPABILITIES, PRODUCT_ASM, PRODUCT_ASM_DATA, PRODUCT_ASM_DD, PRODUCT_ASM_FEATURES,
};
use crate::rules::{initial_manager, CompiledRules, RulesError, RulesManager};

/// Errors preventing the module from starting.
#[derive(Debug, Error)]
pub enum AppsecError {
    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("rule engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("remote config: {0}")]
    Transport(#[from] TransportError),
}

/// Whether protections are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Stopped,
    Running,
}

/// Everything a reader needs, published as one unit.
#[derive(Debug, Clone)]
pub struct LiveState {
    pub activation: Activation,
    pub manager: Arc<RulesManager>,
    pub compiled: Arc<CompiledRules>,
    /// Incremented on every published change.
    pub generation: u64,
}

impl LiveState {
    pub fn is_running(&self) -> bool {
        self.activation == Activation::Running
    }
}

/// The protection module.
pub struct Appsec {
    state: ArcSwap<LiveState>,
    writer: Mutex<()>,
    engine: Arc<dyn RuleEngine>,
    client: Option<Arc<dyn RemoteConfigClient>>,
    sender: UpdateSender,
    config: AppsecConfig,
}

impl Appsec {
    /// Build a stopped module over the startup ruleset.
    ///
    /// `sender` is the handle registered with the transport so deliveries
    /// reach the update worker.
    pub fn new(
        config: AppsecConfig,
        engine: Arc<dyn RuleEngine>,
        client: Option<Arc<dyn RemoteConfigClient>>,
        sender: UpdateSender,
    ) -> Result<Self, AppsecError> {
        let manager = initial_manager(config.rules_file.as_deref())?;
        let compiled = manager.compile();

        Ok(Self {
            state: ArcSwap::from_pointee(LiveState {
                activation: Activation::Stopped,
                manager: Arc::new(manager),
                compiled: Arc::new(compiled),
                generation: 0,
            }),
            writer: Mutex::new(()),
            engine,
            client,
            sender,
            config,
        })
    }

    /// Current live state. Lock-free.
    pub fn snapshot(&self) -> Arc<LiveState> {
        self.state.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.state.load().is_running()
    }

    /// True when an operator pinned a static ruleset.
    pub fn rules_pinned(&self) -> bool {
        self.config.rules_file.is_some()
    }

    /// Apply the configured activation mode.
    ///
    /// Forced on: start now. Forced off: do nothing. Unset: wait for
    /// remote activation. Remote config failures are logged only.
    pub fn launch(&self) -> Result<(), AppsecError> {
        match self.config.enabled {
            Some(true) => self.start(),
            Some(false) => {
                tracing::info!("Protections disabled by configuration");
                Ok(())
            }
            None => {
                if let Err(e) = self.enable_activation() {
                    tracing::warn!(error = %e, "Remote activation unavailable");
                }
                Ok(())
            }
        }
    }

    /// Start protections.
    pub fn start(&self) -> Result<(), AppsecError> {
        let _guard = self.lock_writer();
        self.start_locked()
    }

    /// Stop protections.
    pub fn stop(&self) {
        let _guard = self.lock_writer();
        self.stop_locked();
    }

    /// Enter the writer section.
    ///
    /// The mutex guards no data: a writer that panicked left the live state
    /// at its last published value, so a poisoned lock is taken over.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Writer lock poisoned by a panicked update, continuing with the last published state");
            poisoned.into_inner()
        })
    }

    fn start_locked(&self) -> Result<(), AppsecError> {
        let current = self.state.load_full();
        if current.is_running() {
            return Ok(());
        }
        self.engine.start(&current.compiled)?;
        self.publish(LiveState {
            activation: Activation::Running,
            ..(*current).clone()
        });
        self.enable_blocking();
        self.enable_rasp();
        tracing::info!(base_path = %current.manager.base_path(), "Protections started");
        Ok(())
    }

    fn stop_locked(&self) {
        let current = self.state.load_full();
        if !current.is_running() {
            return;
        }
        self.disable_blocking();
        self.disable_rasp();
        self.engine.stop();
        self.publish(LiveState {
            activation: Activation::Stopped,
            ..(*current).clone()
        });
        tracing::info!("Protections stopped");
    }

    fn publish(&self, mut next: LiveState) {
        next.generation = self.state.load().generation + 1;
        metrics::record_generation(next.generation);
        self.state.store(Arc::new(next));
    }

    fn client(&self) -> Result<&Arc<dyn RemoteConfigClient>, TransportError> {
        self.client.as_ref().ok_or(TransportError::NotConfigured)
    }

    /// Subscribe to feature activation. Runs once at startup.
    pub fn enable_activation(&self) -> Result<(), TransportError> {
        let client = self.client()?;
        client.register_product(PRODUCT_ASM_FEATURES)?;
        client.register_capability(Capability::AsmActivation)?;
        client.register_listener(Listener::Activation, self.sender.clone())
    }

    /// Subscribe to rules products and advertise blocking capabilities.
    ///
    /// Individual registration failures are logged and skipped.
    pub fn enable_blocking(&self) {
        let Ok(client) = self.client() else {
            tracing::debug!("No remote config client, blocking capabilities not enabled");
            return;
        };
        if let Some(path) = &self.config.rules_file {
            tracing::debug!(path = %path.display(), "Using static rules, blocking capabilities won't be enabled");
            return;
        }

        for product in [PRODUCT_ASM, PRODUCT_ASM_DD, PRODUCT_ASM_DATA] {
            if let Err(e) = client.register_product(product) {
                tracing::debug!(product, error = %e, "Couldn't register product");
            }
        }
        if let Err(e) = client.register_listener(Listener::RulesUpdate, self.sender.clone()) {
            tracing::debug!(error = %e, "Couldn't register rules listener");
        }
        for capability in BLOCKING_CAPABILITIES {
            if let Err(e) = client.register_capability(capability) {
                metrics::record_capability_error("register");
                tracing::debug!(%capability, error = %e, "Couldn't register capability");
            }
        }
    }

    /// Inverse of [`Appsec::enable_blocking`]. Safe without a client.
    pub fn disable_blocking(&self) {
        let Ok(client) = self.client() else {
            return;
        };
        for capability in BLOCKING_CAPABILITIES {
            if let Err(e) = client.unregister_capability(capability) {
                metrics::record_capability_error("unregister");
                tracing::debug!(%capability, error = %e, "Couldn't unregister capability");
            }
        }
        if let Err(e) = client.unregister_listener(Listener::RulesUpdate) {
            tracing::debug!(error = %e, "Couldn't unregister rules listener");
        }
    }

    fn rasp_capabilities(&self) -> Vec<Capability> {
        let mut capabilities = vec![Capability::AsmRaspSsrf, Capability::AsmRaspSqli];
        if self.config.lfi_supported {
            capabilities.push(Capability::AsmRaspLfi);
        }
        capabilities
    }

    fn enable_rasp(&self) {
        if !self.config.rasp {
            return;
        }
        let Ok(client) = self.client() else {
            return;
        };
        for capability in self.rasp_capabilities() {
            if let Err(e) = client.register_capability(capability) {
                metrics::record_capability_error("register");
                tracing::debug!(%capability, error = %e, "Couldn't register RASP capability");
            }
        }
    }

    fn disable_rasp(&self) {
        let Ok(client) = self.client() else {
            return;
        };
        for capability in self.rasp_capabilities() {
            if let Err(e) = client.unregister_capability(capability) {
                tracing::debug!(%capability, error = %e, "Couldn't unregister RASP capability");
            }
        }
    }

    /// Route a delivery to its handler.
    pub fn dispatch(&self, listener: Listener, updates: &Updates) -> Statuses {
        match listener {
            Listener::Activation => self.on_activation(updates),
            Listener::RulesUpdate => self.on_rules_update(updates),
        }
    }

    /// Feature activation handler.
    pub fn on_activation(&self, updates: &Updates) -> Statuses {
        match updates.get(PRODUCT_ASM_FEATURES) {
            Some(update) => {
                let _guard = self.lock_writer();
                self.handle_features(update)
            }
            None => Statuses::new(),
        }
    }

    fn handle_features(&self, update: &ProductUpdate) -> Statuses {
        let mut statuses = Statuses::new();
        set_statuses(&mut statuses, update, &ApplyStatus::Unacknowledged);

        if update.len() > 1 {
            tracing::error!(
                configs = update.len(),
                "Received several {} configs, expected one at most",
                PRODUCT_ASM_FEATURES
            );
            metrics::record_batch("activation", "rejected");
            return statuses;
        }

        for (path, raw) in update {
            tracing::debug!(path = %path, "Processing activation config");
            // A retracted config means remote activation was turned off.
            // The path is intentionally left unacknowledged.
            let Some(raw) = raw else {
                tracing::debug!("Activation config removed, stopping protections");
                self.stop_locked();
                return statuses;
            };

            let data: FeaturesData = match serde_json::from_slice(raw) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Could not parse activation config");
                    statuses.insert(path.clone(), ApplyStatus::error(e));
                    continue;
                }
            };

            let running = self.state.load().is_running();
            if data.asm.enabled && !running {
                tracing::debug!("Starting protections");
                if let Err(e) = self.start_locked() {
                    tracing::error!(path = %path, error = %e, "Could not start protections");
                    statuses.insert(path.clone(), ApplyStatus::error(e));
                    continue;
                }
            } else if !data.asm.enabled && running {
                tracing::debug!("Stopping protections");
                self.stop_locked();
            }
            statuses.insert(path.clone(), ApplyStatus::Acknowledged);
        }

        metrics::record_batch("activation", "applied");
        statuses
    }

    /// Rules update handler: clone, combine, compile, validate, swap.
    pub fn on_rules_update(&self, updates: &Updates) -> Statuses {
        let _guard = self.lock_writer();

        let current = self.state.load_full();
        if !current.is_running() {
            return Statuses::new();
        }

        let mut manager = RulesManager::clone(&current.manager);
        let mut statuses = match combine_rules_updates(&mut manager, updates) {
            Ok(statuses) => statuses,
            Err(failure) => {
                tracing::debug!(error = %failure.error, "Not applying any rules update");
                metrics::record_batch("rules", "rejected");
                return failure.statuses;
            }
        };

        let compiled = manager.compile();
        tracing::debug!(rules = %compiled, "Compiled rules");

        // The faulty config can't be told apart: every path gets the error.
        if let Err(e) = self.engine.update(&compiled) {
            tracing::error!(error = %e, "Could not apply the new security rules");
            for status in statuses.values_mut() {
                *status = ApplyStatus::error(&e);
            }
            metrics::record_batch("rules", "engine_error");
            return statuses;
        }

        tracing::info!(
            base_path = %manager.base_path(),
            edits = manager.edits().len(),
            "Security rules updated"
        );
        self.publish(LiveState {
            activation: Activation::Running,
            manager: Arc::new(manager),
            compiled: Arc::new(compiled),
            generation: current.generation,
        });
        metrics::record_batch("rules", "applied");
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appsec::engine::StructuralEngine;
    use crate::appsec::worker;
    use crate::remoteconfig::LocalClient;

    fn new_appsec(config: AppsecConfig) -> (Appsec, Arc<LocalClient>) {
        let client = Arc::new(LocalClient::new());
        let (sender, _rx) = worker::channel(4);
        let appsec = Appsec::new(
            config,
            Arc::new(StructuralEngine::new()),
            Some(client.clone() as Arc<dyn RemoteConfigClient>),
            sender,
        )
        .unwrap();
        (appsec, client)
    }

    fn features(configs: &[(&str, Option<&str>)]) -> Updates {
        let mut updates = Updates::new();
        let update = updates.entry(PRODUCT_ASM_FEATURES.to_string()).or_default();
        for (path, raw) in configs {
            update.insert(path.to_string(), raw.map(|r| r.as_bytes().to_vec()));
        }
        updates
    }

    #[test]
    fn test_start_stop_publishes_generations() {
        let (appsec, client) = new_appsec(AppsecConfig::default());
        assert!(!appsec.is_running());
        assert_eq!(appsec.snapshot().generation, 0);

        appsec.start().unwrap();
        assert!(appsec.is_running());
        assert_eq!(appsec.snapshot().generation, 1);
        assert!(client.has_capability(Capability::AsmIpBlocking));
        assert!(client.has_listener(Listener::RulesUpdate));

        appsec.start().unwrap();
        assert_eq!(appsec.snapshot().generation, 1);

        appsec.stop();
        assert!(!appsec.is_running());
        assert!(!client.has_capability(Capability::AsmIpBlocking));
        assert!(!client.has_listener(Listener::RulesUpdate));
    }

    #[test]
    fn test_activation_toggle() {
        let (appsec, _client) = new_appsec(AppsecConfig::default());

        let statuses = appsec.on_activation(&features(&[("f", Some(r#"{"asm":{"enabled":true}}"#))]));
        assert_eq!(statuses["f"], ApplyStatus::Acknowledged);
        assert!(appsec.is_running());

        let statuses = appsec.on_activation(&features(&[("f", Some(r#"{"asm":{"enabled":false}}"#))]));
        assert_eq!(statuses["f"], ApplyStatus::Acknowledged);
        assert!(!appsec.is_running());
    }

    #[test]
    fn test_activation_removal_not_acknowledged() {
        let (appsec, _client) = new_appsec(AppsecConfig::default());
        appsec.start().unwrap();

        let statuses = appsec.on_activation(&features(&[("f", None)]));
        assert_eq!(statuses["f"], ApplyStatus::Unacknowledged);
        assert!(!appsec.is_running());
    }

    #[test]
    fn test_malformed_activation_config() {
        let (appsec, _client) = new_appsec(AppsecConfig::default());
        let statuses = appsec.on_activation(&features(&[("f", Some("{"))]));
        assert!(statuses["f"].is_error());
        assert!(!appsec.is_running());
    }

    #[test]
    fn test_rules_update_ignored_when_stopped() {
        let (appsec, _client) = new_appsec(AppsecConfig::default());
        let mut updates = Updates::new();
        updates
            .entry(PRODUCT_ASM.to_string())
            .or_default()
            .insert("a".into(), Some(br#"{"exclusions": []}"#.to_vec()));

        assert!(appsec.on_rules_update(&updates).is_empty());
        assert!(appsec.snapshot().manager.edits().is_empty());
    }

    #[test]
    fn test_rasp_capabilities() {
        let (appsec, client) = new_appsec(AppsecConfig {
            lfi_supported: true,
            ..AppsecConfig::default()
        });
        appsec.start().unwrap();
        assert!(client.has_capability(Capability::AsmRaspSsrf));
        assert!(client.has_capability(Capability::AsmRaspSqli));
        assert!(client.has_capability(Capability::AsmRaspLfi));

        let (appsec, client) = appsec_without_rasp();
        appsec.start().unwrap();
        assert!(!client.has_capability(Capability::AsmRaspSsrf));
    }

    fn appsec_without_rasp() -> (Appsec, Arc<LocalClient>) {
        new_appsec(AppsecConfig {
            rasp: false,
            ..AppsecConfig::default()
        })
    }

    #[test]
    fn test_no_client_is_harmless() {
        let (sender, _rx) = worker::channel(1);
        let appsec = Appsec::new(AppsecConfig::default(), Arc::new(StructuralEngine::new()), None, sender).unwrap();

        assert!(matches!(appsec.enable_activation(), Err(TransportError::NotConfigured)));
        appsec.enable_blocking();
        appsec.disable_blocking();
        appsec.disable_blocking();
        appsec.start().unwrap();
        appsec.stop();
    }

    #[test]
    fn test_poisoned_writer_lock_is_recovered() {
        let (appsec, _client) = new_appsec(AppsecConfig::default());

        std::thread::scope(|s| {
            let result = s
                .spawn(|| {
                    let _guard = appsec.writer.lock().unwrap();
                    panic!("writer panicked");
                })
                .join();
            assert!(result.is_err());
        });
        assert!(appsec.writer.is_poisoned());

        appsec.start().unwrap();
        assert!(appsec.is_running());
        assert_eq!(appsec.snapshot().generation, 1);
    }

    #[test]
    fn test_launch_modes() {
        let (forced_on, _) = new_appsec(AppsecConfig {
            enabled: Some(true),
            ..AppsecConfig::default()
        });
        forced_on.launch().unwrap();
        assert!(forced_on.is_running());

        let (forced_off, client) = new_appsec(AppsecConfig {
            enabled: Some(false),
            ..AppsecConfig::default()
        });
        forced_off.launch().unwrap();
        assert!(!forced_off.is_running());
        assert!(!client.has_listener(Listener::Activation));

        let (remote, client) = new_appsec(AppsecConfig::default());
        remote.launch().unwrap();
        assert!(!remote.is_running());
        assert!(client.has_listener(Listener::Activation));
        assert!(client.has_capability(Capability::AsmActivation));
        assert!(client.products().contains(PRODUCT_ASM_FEATURES));
    }
}
