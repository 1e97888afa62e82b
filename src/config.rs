//! Configuration envelope and shared card schema.
//!
//! The envelope is a document-oriented, schema-versioned record
//! (camelCase JSON keys, current schema `"2.0.0"`). All numeric fields
//! are non-negative integers in the centiunit convention; see
//! [`crate::centi`]. The envelope is pure data — validation lives in
//! [`crate::commit::validate`], compilation in [`crate::commit`].

use serde::{Deserialize, Serialize};

use crate::card::ai::AiConfig;
use crate::card::di::DiConfig;
use crate::card::math::MathConfig;
use crate::card::mission::{DoConfig, SioConfig};
use crate::card::rtc::RtcConfig;

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: &str = "2.0.0";

// ───────────────────────────────────────────────────────────────
// Envelope
// ───────────────────────────────────────────────────────────────

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEnvelope {
    pub schema_version: String,
    /// Caller-chosen identity of this configuration revision.
    pub config_id: String,
    /// Seconds since epoch when the envelope was authored.
    pub created_at: u64,
    pub scan: ScanSettings,
    #[serde(default)]
    pub cards: Vec<CardConfig>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    pub wifi: WifiSettings,
}

impl ConfigEnvelope {
    /// Factory-default envelope: no cards, 10 ms scan, STA-only WiFi.
    pub fn factory() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            config_id: "factory".to_string(),
            created_at: 0,
            scan: ScanSettings::default(),
            cards: Vec::new(),
            bindings: Vec::new(),
            wifi: WifiSettings::default(),
        }
    }

    /// Canonical JSON bytes for slot storage. Stable field order comes
    /// from the struct definitions, so equal envelopes produce equal
    /// bytes and slot contents can be compared directly.
    pub fn to_slot_bytes(&self) -> Vec<u8> {
        // Serialization of this type cannot fail: no maps with
        // non-string keys, no non-finite floats.
        serde_json::to_vec(self).expect("envelope serialization is infallible")
    }

    pub fn from_slot_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Scan cadence and budget settings. Fixed between commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// Scan interval in milliseconds, 10..=1000.
    pub interval_ms: u32,
    /// Allowed start-time deviation per scan before a jitter fault.
    pub jitter_budget_us: u32,
    /// Allowed scan duration before a SCAN_OVERRUN fault.
    pub overrun_budget_us: u32,
    /// Command queue capacity (ring slots).
    #[serde(default = "default_queue_depth")]
    pub command_queue_depth: u16,
    /// Maximum commands drained per tick.
    #[serde(default = "default_drain_per_tick")]
    pub command_drain_per_tick: u16,
}

fn default_queue_depth() -> u16 {
    16
}

fn default_drain_per_tick() -> u16 {
    8
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            jitter_budget_us: 2_000,
            overrun_budget_us: 8_000,
            command_queue_depth: default_queue_depth(),
            command_drain_per_tick: default_drain_per_tick(),
        }
    }
}

/// WiFi policy carried in the envelope. Connectivity itself is
/// external; the kernel only validates the policy gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiSettings {
    /// Station-only operation is mandatory (no AP mode in the field).
    pub sta_only: bool,
    #[serde(default)]
    pub ssid: String,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            sta_only: true,
            ssid: String::new(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Cards
// ───────────────────────────────────────────────────────────────

/// Card families. Evaluation order is by ascending `cardId`, never by
/// family; the discriminant only selects the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    #[serde(rename = "DI")]
    Di,
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "SIO")]
    Sio,
    #[serde(rename = "DO")]
    Do,
    #[serde(rename = "MATH")]
    Math,
    #[serde(rename = "RTC")]
    Rtc,
}

impl CardType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Di => "DI",
            Self::Ai => "AI",
            Self::Sio => "SIO",
            Self::Do => "DO",
            Self::Math => "MATH",
            Self::Rtc => "RTC",
        }
    }
}

/// How IO faults on this card escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultPolicy {
    Info,
    Warn,
    Critical,
}

/// A single typed processing unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    /// Globally unique, stable; determines evaluation order.
    pub card_id: u32,
    pub enabled: bool,
    /// Non-empty operator-facing name.
    pub label: String,
    pub fault_policy: FaultPolicy,
    #[serde(flatten)]
    pub behavior: CardBehavior,
}

impl CardConfig {
    pub fn card_type(&self) -> CardType {
        self.behavior.card_type()
    }
}

/// Family-specific configuration variant. Serialized as
/// `{"cardType": "...", "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cardType", content = "config")]
pub enum CardBehavior {
    #[serde(rename = "DI")]
    Di(DiConfig),
    #[serde(rename = "AI")]
    Ai(AiConfig),
    #[serde(rename = "SIO")]
    Sio(SioConfig),
    #[serde(rename = "DO")]
    Do(DoConfig),
    #[serde(rename = "MATH")]
    Math(MathConfig),
    #[serde(rename = "RTC")]
    Rtc(RtcConfig),
}

impl CardBehavior {
    pub fn card_type(&self) -> CardType {
        match self {
            Self::Di(_) => CardType::Di,
            Self::Ai(_) => CardType::Ai,
            Self::Sio(_) => CardType::Sio,
            Self::Do(_) => CardType::Do,
            Self::Math(_) => CardType::Math,
            Self::Rtc(_) => CardType::Rtc,
        }
    }
}

/// An inclusive numeric range in centiunits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Engineering unit attached to analog values. Checked at commit when
/// a binding connects two cards that both declare a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    #[default]
    None,
    Percent,
    Celsius,
    Millivolt,
    Millibar,
    Ppm,
}

// ───────────────────────────────────────────────────────────────
// Bindings
// ───────────────────────────────────────────────────────────────

/// A validated edge from a consumer parameter to a constant or another
/// card's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub binding_id: u32,
    pub target: BindTarget,
    pub source: BindSource,
}

/// The consumer side: which parameter of which card is bound. The
/// path is kept verbatim from the document; anything that does not
/// parse to a [`ParamPath`] is a runtime variable owned by its card
/// and rejected at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindTarget {
    pub card_id: u32,
    pub path: String,
}

/// The bindable parameter paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPath {
    MathInputA,
    MathInputB,
    PidSetpoint,
    PidProcessVariable,
}

impl ParamPath {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MathInputA => "math.inputA",
            Self::MathInputB => "math.inputB",
            Self::PidSetpoint => "pid.setpoint",
            Self::PidProcessVariable => "pid.processVariable",
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        match path {
            "math.inputA" => Some(Self::MathInputA),
            "math.inputB" => Some(Self::MathInputB),
            "pid.setpoint" => Some(Self::PidSetpoint),
            "pid.processVariable" => Some(Self::PidProcessVariable),
            _ => None,
        }
    }
}

/// The producer side of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum BindSource {
    #[serde(rename = "CONSTANT")]
    Constant { value: u32 },
    #[serde(rename = "VARIABLE_REF")]
    VariableRef {
        #[serde(rename = "ref")]
        reference: VarRef,
    },
}

/// Reference to another card's published `currentValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarRef {
    pub card_id: u32,
}

// ───────────────────────────────────────────────────────────────
// Hardware profile
// ───────────────────────────────────────────────────────────────

/// Capacity of the physical platform the configuration must fit.
/// Not part of the envelope — it describes the device, not the logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProfile {
    pub di_channels: u8,
    pub do_channels: u8,
    pub ai_channels: u8,
    pub sio_capacity: u16,
    pub math_capacity: u16,
    pub rtc_capacity: u16,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        // Matches the shipping controller: 4×DI, 4×DO, 2×AI plus
        // generous soft-card headroom.
        Self {
            di_channels: 4,
            do_channels: 4,
            ai_channels: 2,
            sio_capacity: 16,
            math_capacity: 16,
            rtc_capacity: 8,
        }
    }
}
