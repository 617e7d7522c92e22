//! Shared fixtures for integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use appsec_rc::appsec::{worker, Appsec, EngineError, RuleEngine};
use appsec_rc::config::AppsecConfig;
use appsec_rc::remoteconfig::{LocalClient, RemoteConfigClient, Updates};
use appsec_rc::rules::CompiledRules;

/// Engine that records what it was given and can be told to refuse updates.
#[derive(Default)]
pub struct RecordingEngine {
    pub fail_updates: AtomicBool,
    pub fail_start: AtomicBool,
    pub updates: AtomicUsize,
    pub active: Mutex<Option<CompiledRules>>,
}

impl RuleEngine for RecordingEngine {
    fn start(&self, rules: &CompiledRules) -> Result<(), EngineError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::InvalidRules("start refused".into()));
        }
        *self.active.lock().unwrap() = Some(rules.clone());
        Ok(())
    }

    fn update(&self, rules: &CompiledRules) -> Result<(), EngineError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(EngineError::InvalidRules("update refused".into()));
        }
        *self.active.lock().unwrap() = Some(rules.clone());
        Ok(())
    }

    fn stop(&self) {
        *self.active.lock().unwrap() = None;
    }
}

pub struct Fixture {
    pub appsec: Arc<Appsec>,
    pub engine: Arc<RecordingEngine>,
    pub client: Arc<LocalClient>,
}

/// A module wired to a `LocalClient`, without a worker.
#[allow(dead_code)]
pub fn fixture(config: AppsecConfig) -> Fixture {
    let engine = Arc::new(RecordingEngine::default());
    let client = Arc::new(LocalClient::new());
    let (sender, _deliveries) = worker::channel(8);
    let transport: Arc<dyn RemoteConfigClient> = client.clone();
    let appsec = Appsec::new(config, engine.clone(), Some(transport), sender).unwrap();
    Fixture {
        appsec: Arc::new(appsec),
        engine,
        client,
    }
}

/// A running module over the default rules.
#[allow(dead_code)]
pub fn running() -> Fixture {
    let f = fixture(AppsecConfig::default());
    f.appsec.start().unwrap();
    f
}

/// Build a delivery from `(product, path, payload)` triples.
#[allow(dead_code)]
pub fn batch(configs: &[(&str, &str, Option<&str>)]) -> Updates {
    let mut updates = Updates::new();
    for (product, path, raw) in configs {
        updates
            .entry(product.to_string())
            .or_default()
            .insert(path.to_string(), raw.map(|r| r.as_bytes().to_vec()));
    }
    updates
}

/// A module plus the receiving end of its delivery channel, for tests
/// that run the update worker.
#[allow(dead_code)]
pub fn served(
    config: AppsecConfig,
) -> (Fixture, tokio::sync::mpsc::Receiver<appsec_rc::remoteconfig::Delivery>) {
    let engine = Arc::new(RecordingEngine::default());
    let client = Arc::new(LocalClient::new());
    let (sender, deliveries) = worker::channel(8);
    let transport: Arc<dyn RemoteConfigClient> = client.clone();
    let appsec = Appsec::new(config, engine.clone(), Some(transport), sender).unwrap();
    let fixture = Fixture {
        appsec: Arc::new(appsec),
        engine,
        client,
    };
    (fixture, deliveries)
}
