//! Remote config wire types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Feature activation toggles.
pub const PRODUCT_ASM_FEATURES: &str = "ASM_FEATURES";
/// Overlay rules: every config is an independent edit.
pub const PRODUCT_ASM: &str = "ASM";
/// Base rules: at most one active config.
pub const PRODUCT_ASM_DD: &str = "ASM_DD";
/// Rules data (block lists, pass lists).
pub const PRODUCT_ASM_DATA: &str = "ASM_DATA";

/// Configs of one product keyed by config path. `None` means the config
/// was retracted.
pub type ProductUpdate = BTreeMap<String, Option<Vec<u8>>>;

/// One delivery: product name → product update.
pub type Updates = BTreeMap<String, ProductUpdate>;

/// Per config path acknowledgment returned to the transport.
pub type Statuses = BTreeMap<String, ApplyStatus>;

/// Outcome of applying one config path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireStatus", from = "WireStatus")]
pub enum ApplyStatus {
    Unacknowledged,
    Acknowledged,
    Error(String),
}

impl ApplyStatus {
    pub fn error(err: impl fmt::Display) -> Self {
        ApplyStatus::Error(err.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApplyStatus::Error(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ApplyState {
    Unacknowledged,
    Acknowledged,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireStatus {
    state: ApplyState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ApplyStatus> for WireStatus {
    fn from(status: ApplyStatus) -> Self {
        match status {
            ApplyStatus::Unacknowledged => WireStatus {
                state: ApplyState::Unacknowledged,
                error: None,
            },
            ApplyStatus::Acknowledged => WireStatus {
                state: ApplyState::Acknowledged,
                error: None,
            },
            ApplyStatus::Error(msg) => WireStatus {
                state: ApplyState::Error,
                error: Some(msg),
            },
        }
    }
}

impl From<WireStatus> for ApplyStatus {
    fn from(wire: WireStatus) -> Self {
        match wire.state {
            ApplyState::Unacknowledged => ApplyStatus::Unacknowledged,
            ApplyState::Acknowledged => ApplyStatus::Acknowledged,
            ApplyState::Error => ApplyStatus::Error(wire.error.unwrap_or_default()),
        }
    }
}

/// Set every path of `update` to `status`.
pub fn set_statuses(statuses: &mut Statuses, update: &ProductUpdate, status: &ApplyStatus) {
    for path in update.keys() {
        statuses.insert(path.clone(), status.clone());
    }
}

/// Parse a delivery written as JSON: `{product: {path: payload | null}}`.
///
/// Payloads are re-serialized to the raw bytes a transport would hand over.
pub fn parse_updates(raw: &[u8]) -> serde_json::Result<Updates> {
    let doc: BTreeMap<String, BTreeMap<String, serde_json::Value>> = serde_json::from_slice(raw)?;
    let mut updates = Updates::new();
    for (product, configs) in doc {
        let mut update = ProductUpdate::new();
        for (path, payload) in configs {
            let bytes = match payload {
                serde_json::Value::Null => None,
                payload => Some(serde_json::to_vec(&payload)?),
            };
            update.insert(path, bytes);
        }
        updates.insert(product, update);
    }
    Ok(updates)
}

/// Feature activation payload: `{"asm": {"enabled": bool}}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeaturesData {
    #[serde(default)]
    pub asm: AsmFeature,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AsmFeature {
    #[serde(default)]
    pub enabled: bool,
}

/// Features advertised to the remote config backend.
///
/// The discriminant is the bit index used on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    AsmActivation = 1,
    AsmIpBlocking = 2,
    AsmDdRules = 3,
    AsmExclusions = 4,
    AsmRequestBlocking = 5,
    AsmUserBlocking = 7,
    AsmCustomRules = 8,
    AsmCustomBlockingResponse = 9,
    AsmTrustedIps = 10,
    AsmExclusionData = 18,
    AsmRaspSqli = 21,
    AsmRaspLfi = 22,
    AsmRaspSsrf = 23,
    AsmEndpointFingerprinting = 32,
    AsmSessionFingerprinting = 33,
    AsmNetworkFingerprinting = 34,
    AsmHeaderFingerprinting = 35,
}

/// Capabilities that come and go with the protections.
pub const BLOCKING_CAPABILITIES: [Capability; 13] = [
    Capability::AsmUserBlocking,
    Capability::AsmRequestBlocking,
    Capability::AsmIpBlocking,
    Capability::AsmDdRules,
    Capability::AsmExclusions,
    Capability::AsmCustomRules,
    Capability::AsmCustomBlockingResponse,
    Capability::AsmTrustedIps,
    Capability::AsmExclusionData,
    Capability::AsmEndpointFingerprinting,
    Capability::AsmSessionFingerprinting,
    Capability::AsmNetworkFingerprinting,
    Capability::AsmHeaderFingerprinting,
];

impl Capability {
    pub const ALL: [Capability; 17] = [
        Capability::AsmActivation,
        Capability::AsmIpBlocking,
        Capability::AsmDdRules,
        Capability::AsmExclusions,
        Capability::AsmRequestBlocking,
        Capability::AsmUserBlocking,
        Capability::AsmCustomRules,
        Capability::AsmCustomBlockingResponse,
        Capability::AsmTrustedIps,
        Capability::AsmExclusionData,
        Capability::AsmRaspSqli,
        Capability::AsmRaspLfi,
        Capability::AsmRaspSsrf,
        Capability::AsmEndpointFingerprinting,
        Capability::AsmSessionFingerprinting,
        Capability::AsmNetworkFingerprinting,
        Capability::AsmHeaderFingerprinting,
    ];

    /// Wire bit index.
    pub fn bit(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::AsmActivation => "ASM_ACTIVATION",
            Capability::AsmIpBlocking => "ASM_IP_BLOCKING",
            Capability::AsmDdRules => "ASM_DD_RULES",
            Capability::AsmExclusions => "ASM_EXCLUSIONS",
            Capability::AsmRequestBlocking => "ASM_REQUEST_BLOCKING",
            Capability::AsmUserBlocking => "ASM_USER_BLOCKING",
            Capability::AsmCustomRules => "ASM_CUSTOM_RULES",
            Capability::AsmCustomBlockingResponse => "ASM_CUSTOM_BLOCKING_RESPONSE",
            Capability::AsmTrustedIps => "ASM_TRUSTED_IPS",
            Capability::AsmExclusionData => "ASM_EXCLUSION_DATA",
            Capability::AsmRaspSqli => "ASM_RASP_SQLI",
            Capability::AsmRaspLfi => "ASM_RASP_LFI",
            Capability::AsmRaspSsrf => "ASM_RASP_SSRF",
            Capability::AsmEndpointFingerprinting => "ASM_ENDPOINT_FINGERPRINT",
            Capability::AsmSessionFingerprinting => "ASM_SESSION_FINGERPRINT",
            Capability::AsmNetworkFingerprinting => "ASM_NETWORK_FINGERPRINT",
            Capability::AsmHeaderFingerprinting => "ASM_HEADER_FINGERPRINT",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
