//! Analog input evaluator.
//!
//! AI cards are pure transducers: stateless except for the EMA
//! accumulator. Pipeline order is fixed — raw sample, clamp, affine
//! scale, filter — and runs every scan in deterministic order. AI is
//! never gated by set/reset (rejected at commit).

use serde::{Deserialize, Serialize};

use crate::card::condition::ConditionBlock;
use crate::centi;
use crate::config::{Range, Unit};
use crate::error::IoError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub channel: u8,
    #[serde(default)]
    pub unit: Unit,
    /// Raw domain mapped onto `output_range`. Requires min ≤ max.
    pub input_range: Range,
    /// Hard clamp applied to the raw sample before scaling.
    pub clamp_range: Range,
    /// Scaled output endpoints, centiunits. May be decreasing.
    pub output_range: Range,
    /// Filter weight 0..=100; 100 disables smoothing.
    pub ema_alpha: u32,
    /// Schema placeholders: AI is never gated. Presence is a
    /// validation error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ConditionBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ConditionBlock>,
}

/// Sample quality published with every value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    #[default]
    Good,
    /// Raw sample fell outside the declared input range.
    Clamped,
    /// The adapter reported a read failure; value is held.
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiRuntime {
    /// Filtered output, centiunits. Doubles as the EMA accumulator.
    pub current_value: u32,
    pub quality: Quality,
}

/// Run one scan of the AI pipeline.
///
/// Returns nothing; on read failure the previous filtered value is
/// held and the quality flag reports INVALID (the caller escalates
/// card health per its fault policy).
pub fn evaluate(cfg: &AiConfig, rt: &mut AiRuntime, sample: Result<u32, IoError>) {
    let raw = match sample {
        Ok(raw) => raw,
        Err(_) => {
            rt.quality = Quality::Invalid;
            return;
        }
    };

    rt.quality = if cfg.input_range.contains(raw) {
        Quality::Good
    } else {
        Quality::Clamped
    };

    let clamped = raw.clamp(cfg.clamp_range.min, cfg.clamp_range.max.max(cfg.clamp_range.min));
    let scaled = centi::affine_map(
        clamped,
        cfg.input_range.min,
        cfg.input_range.max,
        cfg.output_range.min,
        cfg.output_range.max,
    );
    rt.current_value = centi::ema_step(rt.current_value, scaled, cfg.ema_alpha);
}
