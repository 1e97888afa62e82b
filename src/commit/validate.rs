//! Staged-configuration validation.
//!
//! Every check emits a structured [`ValidationError`] with a stable
//! code and a dotted field path, and validation always runs to the end
//! so the operator sees the full list, not the first failure. A staged
//! document that passes here is guaranteed compilable: the kernel
//! never re-validates at scan time.

use std::collections::{BTreeMap, BTreeSet};

use crate::card::condition::{Clause, ConditionBlock, Combiner, Operator, SourceField, ValueType};
use crate::card::math::{MathConfig, MathMode};
use crate::config::{
    BindSource, CardBehavior, CardConfig, CardType, ConfigEnvelope, HardwareProfile, ParamPath,
    Unit, SCHEMA_VERSION,
};
use crate::error::{ValidationCode, ValidationError};

use super::topology;

/// Run the full check suite. An empty list means the envelope is valid.
pub fn check(envelope: &ConfigEnvelope, profile: &HardwareProfile) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let by_id: BTreeMap<u32, &CardConfig> =
        envelope.cards.iter().map(|c| (c.card_id, c)).collect();

    check_envelope(envelope, &mut errors);
    check_identity(envelope, &mut errors);
    for (i, card) in envelope.cards.iter().enumerate() {
        check_card(i, card, profile, &by_id, &mut errors);
    }
    check_capacities(envelope, profile, &mut errors);
    check_bindings(envelope, &by_id, &mut errors);

    if let Some(cycle) = topology::find_cycle(envelope) {
        let path_str = cycle
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        errors.push(ValidationError::new(
            "bindings",
            ValidationCode::VCfg013,
            format!("dependency cycle: {path_str}"),
        ));
    }

    errors
}

// ───────────────────────────────────────────────────────────────
// Envelope-level checks
// ───────────────────────────────────────────────────────────────

fn check_envelope(envelope: &ConfigEnvelope, errors: &mut Vec<ValidationError>) {
    if envelope.schema_version != SCHEMA_VERSION {
        errors.push(ValidationError::new(
            "schemaVersion",
            ValidationCode::VCfg001,
            format!(
                "schema version '{}' is not supported (expected '{SCHEMA_VERSION}')",
                envelope.schema_version
            ),
        ));
    }
    if !(10..=1000).contains(&envelope.scan.interval_ms) {
        errors.push(ValidationError::new(
            "scan.intervalMs",
            ValidationCode::VCfg005,
            format!(
                "scan interval {} ms outside 10..=1000",
                envelope.scan.interval_ms
            ),
        ));
    }
    if !envelope.wifi.sta_only {
        errors.push(ValidationError::new(
            "wifi.staOnly",
            ValidationCode::VCfg015,
            "station-only operation is mandatory",
        ));
    }
}

fn check_identity(envelope: &ConfigEnvelope, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();
    for (i, card) in envelope.cards.iter().enumerate() {
        if !seen.insert(card.card_id) {
            errors.push(ValidationError::new(
                format!("cards[{i}].cardId"),
                ValidationCode::VCfg002,
                format!("duplicate card id {}", card.card_id),
            ));
        }
    }
}

fn check_capacities(
    envelope: &ConfigEnvelope,
    profile: &HardwareProfile,
    errors: &mut Vec<ValidationError>,
) {
    let count = |t: CardType| envelope.cards.iter().filter(|c| c.card_type() == t).count();
    let gates = [
        (CardType::Sio, profile.sio_capacity),
        (CardType::Math, profile.math_capacity),
        (CardType::Rtc, profile.rtc_capacity),
    ];
    for (card_type, capacity) in gates {
        let n = count(card_type);
        if n > capacity as usize {
            errors.push(ValidationError::new(
                "cards",
                ValidationCode::VCfg019,
                format!(
                    "{n} {} cards exceed the profile capacity of {capacity}",
                    card_type.as_str()
                ),
            ));
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Per-card checks
// ───────────────────────────────────────────────────────────────

fn check_card(
    i: usize,
    card: &CardConfig,
    profile: &HardwareProfile,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    let base = format!("cards[{i}]");
    if card.label.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{base}.label"),
            ValidationCode::VCfg004,
            "label must be non-empty",
        ));
    }

    match &card.behavior {
        CardBehavior::Di(cfg) => {
            check_channel(&base, cfg.channel, profile.di_channels, ValidationCode::VCfg017, errors);
            check_block(&base, "set", cfg.set.as_ref(), by_id, errors);
            check_block(&base, "reset", cfg.reset.as_ref(), by_id, errors);
        }

        CardBehavior::Ai(cfg) => {
            check_channel(&base, cfg.channel, profile.ai_channels, ValidationCode::VCfg018, errors);
            if cfg.set.is_some() || cfg.reset.is_some() {
                errors.push(ValidationError::new(
                    format!("{base}.config"),
                    ValidationCode::VCfg008,
                    "AI cards do not accept set/reset blocks",
                ));
            }
            if cfg.input_range.min > cfg.input_range.max {
                errors.push(ValidationError::new(
                    format!("{base}.config.inputRange"),
                    ValidationCode::VCfg011,
                    format!(
                        "input range min {} above max {}",
                        cfg.input_range.min, cfg.input_range.max
                    ),
                ));
            }
            if cfg.ema_alpha > 100 {
                errors.push(ValidationError::new(
                    format!("{base}.config.emaAlpha"),
                    ValidationCode::VCfg004,
                    format!("emaAlpha {} outside 0..=100", cfg.ema_alpha),
                ));
            }
        }

        CardBehavior::Sio(cfg) => {
            check_block(&base, "set", cfg.mission.set.as_ref(), by_id, errors);
            check_block(&base, "reset", cfg.mission.reset.as_ref(), by_id, errors);
        }

        CardBehavior::Do(cfg) => {
            check_channel(&base, cfg.channel, profile.do_channels, ValidationCode::VCfg017, errors);
            check_block(&base, "set", cfg.mission.set.as_ref(), by_id, errors);
            check_block(&base, "reset", cfg.mission.reset.as_ref(), by_id, errors);
        }

        CardBehavior::Math(cfg) => {
            check_math(&base, cfg, by_id, errors);
            check_block(&base, "set", cfg.set.as_ref(), by_id, errors);
            check_block(&base, "reset", cfg.reset.as_ref(), by_id, errors);
        }

        CardBehavior::Rtc(cfg) => {
            if cfg.set.is_some() || cfg.reset.is_some() {
                errors.push(ValidationError::new(
                    format!("{base}.config"),
                    ValidationCode::VCfg009,
                    "RTC cards do not accept set/reset blocks",
                ));
            }
            check_schedule_bounds(&base, cfg, errors);
        }
    }
}

fn check_channel(
    base: &str,
    channel: u8,
    capacity: u8,
    code: ValidationCode,
    errors: &mut Vec<ValidationError>,
) {
    if channel >= capacity {
        errors.push(ValidationError::new(
            format!("{base}.config.channel"),
            code,
            format!("channel {channel} outside profile capacity {capacity}"),
        ));
    }
}

fn check_schedule_bounds(
    base: &str,
    cfg: &crate::card::rtc::RtcConfig,
    errors: &mut Vec<ValidationError>,
) {
    let s = &cfg.schedule;
    let mut reject = |field: &str, ok: bool, detail: String| {
        if !ok {
            errors.push(ValidationError::new(
                format!("{base}.config.schedule.{field}"),
                ValidationCode::VCfg004,
                detail,
            ));
        }
    };
    reject("hour", s.hour <= 23, format!("hour {} outside 0..=23", s.hour));
    reject(
        "minute",
        s.minute <= 59,
        format!("minute {} outside 0..=59", s.minute),
    );
    reject(
        "second",
        s.second <= 59,
        format!("second {} outside 0..=59", s.second),
    );
    if let Some(month) = s.month {
        reject(
            "month",
            (1..=12).contains(&month),
            format!("month {month} outside 1..=12"),
        );
    }
    if let Some(day) = s.day {
        reject("day", (1..=31).contains(&day), format!("day {day} outside 1..=31"));
    }
    if let Some(weekday) = s.weekday {
        reject(
            "weekday",
            (1..=7).contains(&weekday),
            format!("weekday {weekday} outside 1..=7 (Mon..Sun)"),
        );
    }
}

fn check_math(
    base: &str,
    cfg: &MathConfig,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    match cfg.mode {
        MathMode::StandardPipeline => {
            if cfg.standard.is_none() || cfg.pid.is_some() {
                errors.push(ValidationError::new(
                    format!("{base}.config"),
                    ValidationCode::VCfg010,
                    "StandardPipeline mode requires a standard block and no pid block",
                ));
            }
            if let Some(std_cfg) = &cfg.standard {
                if std_cfg.ema_alpha > 100 {
                    errors.push(ValidationError::new(
                        format!("{base}.config.standard.emaAlpha"),
                        ValidationCode::VCfg004,
                        format!("emaAlpha {} outside 0..=100", std_cfg.ema_alpha),
                    ));
                }
                check_operand_ref(base, "standard.inputA", &std_cfg.input_a, by_id, errors);
                check_operand_ref(base, "standard.inputB", &std_cfg.input_b, by_id, errors);
            }
        }
        MathMode::Pid => {
            if cfg.pid.is_none() || cfg.standard.is_some() {
                errors.push(ValidationError::new(
                    format!("{base}.config"),
                    ValidationCode::VCfg010,
                    "PID mode requires a pid block and no standard block",
                ));
            }
            if let Some(pid) = &cfg.pid {
                if pid.output_min >= pid.output_max {
                    errors.push(ValidationError::new(
                        format!("{base}.config.pid"),
                        ValidationCode::VCfg011,
                        format!(
                            "outputMin {} must be below outputMax {}",
                            pid.output_min, pid.output_max
                        ),
                    ));
                }
                check_operand_ref(base, "pid.setpoint", &pid.setpoint, by_id, errors);
                check_operand_ref(base, "pid.processVariable", &pid.process_variable, by_id, errors);
            }
        }
    }
}

/// A referenced operand must resolve to an enabled card that publishes
/// a numeric `currentValue`.
fn check_operand_ref(
    base: &str,
    field: &str,
    operand: &BindSource,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    let BindSource::VariableRef { reference } = operand else {
        return;
    };
    let path = format!("{base}.config.{field}");
    match by_id.get(&reference.card_id) {
        None => errors.push(ValidationError::new(
            path,
            ValidationCode::VCfg003,
            format!("referenced card {} does not exist", reference.card_id),
        )),
        Some(target) if !target.enabled => errors.push(ValidationError::new(
            path,
            ValidationCode::VCfg003,
            format!("referenced card {} is disabled", reference.card_id),
        )),
        Some(target) if !publishes(target.card_type(), SourceField::CurrentValue) => {
            errors.push(ValidationError::new(
                path,
                ValidationCode::VCfg003,
                format!(
                    "card {} ({}) publishes no numeric value",
                    reference.card_id,
                    target.card_type().as_str()
                ),
            ));
        }
        Some(_) => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Condition blocks
// ───────────────────────────────────────────────────────────────

fn check_block(
    base: &str,
    name: &str,
    block: Option<&ConditionBlock>,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(block) = block else {
        return;
    };
    let path = format!("{base}.config.{name}");

    match (block.combiner, block.clause_b.is_some()) {
        (Combiner::None, true) => errors.push(ValidationError::new(
            format!("{path}.clauseB"),
            ValidationCode::VCfg006,
            "clauseB present without a combiner",
        )),
        (Combiner::And | Combiner::Or, false) => errors.push(ValidationError::new(
            format!("{path}.combiner"),
            ValidationCode::VCfg007,
            "combiner present without clauseB",
        )),
        _ => {}
    }

    check_clause(&format!("{path}.clauseA"), &block.clause_a, by_id, errors);
    if let Some(clause_b) = &block.clause_b {
        check_clause(&format!("{path}.clauseB"), clause_b, by_id, errors);
    }
}

fn check_clause(
    path: &str,
    clause: &Clause,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    let source = &clause.source;

    // Declared type must agree with the field's type.
    if source.value_type != source.field.value_type() {
        errors.push(ValidationError::new(
            format!("{path}.source.type"),
            ValidationCode::VCfg003,
            "declared type does not match the referenced field",
        ));
    }

    // Operator legality and threshold domain per type.
    match source.field.value_type() {
        ValueType::Bool => {
            if !matches!(clause.operator, Operator::Eq | Operator::Neq) {
                errors.push(ValidationError::new(
                    format!("{path}.operator"),
                    ValidationCode::VCfg004,
                    "boolean sources accept only EQ/NEQ",
                ));
            }
            if clause.threshold > 1 {
                errors.push(ValidationError::new(
                    format!("{path}.threshold"),
                    ValidationCode::VCfg004,
                    "boolean threshold must be 0 or 1",
                ));
            }
        }
        ValueType::State => {
            if clause.operator != Operator::Eq {
                errors.push(ValidationError::new(
                    format!("{path}.operator"),
                    ValidationCode::VCfg004,
                    "state sources accept only EQ",
                ));
            }
            if clause.threshold > 2 {
                errors.push(ValidationError::new(
                    format!("{path}.threshold"),
                    ValidationCode::VCfg004,
                    "state threshold must be 0 (IDLE), 1 (ACTIVE) or 2 (FINISHED)",
                ));
            }
        }
        ValueType::Number => {}
    }

    // Reference resolution: existing, enabled, legal field.
    match by_id.get(&source.card_id) {
        None => errors.push(ValidationError::new(
            format!("{path}.source.cardId"),
            ValidationCode::VCfg003,
            format!("referenced card {} does not exist", source.card_id),
        )),
        Some(target) if !target.enabled => errors.push(ValidationError::new(
            format!("{path}.source.cardId"),
            ValidationCode::VCfg003,
            format!("referenced card {} is disabled", source.card_id),
        )),
        Some(target) if !publishes(target.card_type(), source.field) => {
            errors.push(ValidationError::new(
                format!("{path}.source.field"),
                ValidationCode::VCfg003,
                format!(
                    "{} cards do not publish {:?}",
                    target.card_type().as_str(),
                    source.field
                ),
            ));
        }
        Some(_) => {}
    }
}

/// Which runtime fields each family publishes to conditions.
fn publishes(card_type: CardType, field: SourceField) -> bool {
    match card_type {
        CardType::Di => matches!(
            field,
            SourceField::LogicalState
                | SourceField::PhysicalState
                | SourceField::TriggerFlag
                | SourceField::CurrentValue
        ),
        CardType::Ai => field == SourceField::CurrentValue,
        CardType::Sio | CardType::Do => true,
        CardType::Math => field == SourceField::CurrentValue,
        CardType::Rtc => field == SourceField::LogicalState,
    }
}

// ───────────────────────────────────────────────────────────────
// Bindings
// ───────────────────────────────────────────────────────────────

fn check_bindings(
    envelope: &ConfigEnvelope,
    by_id: &BTreeMap<u32, &CardConfig>,
    errors: &mut Vec<ValidationError>,
) {
    let mut targets_seen = BTreeSet::new();

    for (i, binding) in envelope.bindings.iter().enumerate() {
        let base = format!("bindings[{i}]");

        let Some(path) = ParamPath::parse(&binding.target.path) else {
            // Anything that is not a bindable parameter is a runtime
            // variable owned by its card.
            errors.push(ValidationError::new(
                format!("{base}.target.path"),
                ValidationCode::VCfg014,
                format!(
                    "'{}' is not a bindable parameter; runtime variables are owned by their card",
                    binding.target.path
                ),
            ));
            continue;
        };

        if !targets_seen.insert((binding.target.card_id, path.as_str())) {
            errors.push(ValidationError::new(
                format!("{base}.target"),
                ValidationCode::VCfg004,
                format!(
                    "duplicate binding for card {} path {}",
                    binding.target.card_id,
                    path.as_str()
                ),
            ));
        }

        let Some(target) = by_id.get(&binding.target.card_id) else {
            errors.push(ValidationError::new(
                format!("{base}.target.cardId"),
                ValidationCode::VCfg003,
                format!("target card {} does not exist", binding.target.card_id),
            ));
            continue;
        };

        // The parameter must exist on the target: MATH only, and the
        // path family must match the card's mode.
        let target_math = match &target.behavior {
            CardBehavior::Math(cfg) => cfg,
            _ => {
                errors.push(ValidationError::new(
                    format!("{base}.target"),
                    ValidationCode::VCfg003,
                    format!(
                        "{} cards have no parameter {}",
                        target.card_type().as_str(),
                        path.as_str()
                    ),
                ));
                continue;
            }
        };
        let mode_ok = match path {
            ParamPath::MathInputA | ParamPath::MathInputB => {
                target_math.mode == MathMode::StandardPipeline
            }
            ParamPath::PidSetpoint | ParamPath::PidProcessVariable => {
                target_math.mode == MathMode::Pid
            }
        };
        if !mode_ok {
            errors.push(ValidationError::new(
                format!("{base}.target.path"),
                ValidationCode::VCfg003,
                format!("parameter {} does not exist in this MATH mode", path.as_str()),
            ));
        }

        if let BindSource::VariableRef { reference } = &binding.source {
            match by_id.get(&reference.card_id) {
                None => errors.push(ValidationError::new(
                    format!("{base}.source.ref.cardId"),
                    ValidationCode::VCfg003,
                    format!("source card {} does not exist", reference.card_id),
                )),
                Some(source) if !source.enabled => errors.push(ValidationError::new(
                    format!("{base}.source.ref.cardId"),
                    ValidationCode::VCfg003,
                    format!("source card {} is disabled", reference.card_id),
                )),
                Some(source) if !publishes(source.card_type(), SourceField::CurrentValue) => {
                    errors.push(ValidationError::new(
                        format!("{base}.source.ref.cardId"),
                        ValidationCode::VCfg003,
                        format!(
                            "card {} ({}) publishes no numeric value",
                            reference.card_id,
                            source.card_type().as_str()
                        ),
                    ));
                }
                Some(source) => {
                    let source_unit = declared_unit(source);
                    let target_unit = target_math.unit;
                    if source_unit != Unit::None
                        && target_unit != Unit::None
                        && source_unit != target_unit
                    {
                        errors.push(ValidationError::new(
                            format!("{base}.source"),
                            ValidationCode::VCfg012,
                            format!(
                                "unit mismatch: source {:?} vs target {:?}",
                                source_unit, target_unit
                            ),
                        ));
                    }
                }
            }
        }
    }
}

fn declared_unit(card: &CardConfig) -> Unit {
    match &card.behavior {
        CardBehavior::Ai(cfg) => cfg.unit,
        CardBehavior::Math(cfg) => cfg.unit,
        _ => Unit::None,
    }
}
