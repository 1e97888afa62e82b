//! Commit pipeline: validate, compile, rotate, hand off.
//!
//! Runs off the kernel thread. A staged envelope either becomes a
//! validated [`Program`] offered to the kernel's swap mailbox together
//! with a slot rotation, or a structured list of validation errors —
//! in which case the active slot is untouched, byte for byte.
//!
//! ```text
//!  staged ──▶ validate ──▶ compile ──▶ promote slots ──▶ mailbox
//!                │                         │
//!            V-CFG-* errors            active → lkg
//! ```

pub mod slots;
pub mod topology;
pub mod validate;

use serde::{Deserialize, Serialize};

use crate::card::mission::MissionTiming;
use crate::card::{CardCommon, FamilyRuntime};
use crate::centi;
use crate::config::{
    BindSource, Binding, CardBehavior, ConfigEnvelope, HardwareProfile, ParamPath,
};
use crate::error::{Error, Result};
use crate::kernel::program::{CardTiming, CompiledCard, Operand, OperandSet, Program};
use crate::kernel::ProgramMailbox;
use crate::ports::{Slot, Storage};

use slots::SlotStore;

/// Where a restore takes its candidate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreSource {
    Lkg,
    Factory,
}

/// Validate a staged envelope against the hardware profile.
pub fn validate_envelope(
    envelope: &ConfigEnvelope,
    profile: &HardwareProfile,
) -> Result<()> {
    let errors = validate::check(envelope, profile);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

/// Full commit: validate, compile, rotate slots, offer the program to
/// the kernel. Any failure leaves the active configuration unchanged.
pub fn commit_candidate<S: Storage>(
    store: &mut SlotStore<S>,
    mailbox: &ProgramMailbox,
    candidate: ConfigEnvelope,
    profile: &HardwareProfile,
) -> Result<()> {
    validate_envelope(&candidate, profile)?;
    let program = compile(&candidate);
    store.promote(&candidate)?;
    mailbox.offer(program);
    Ok(())
}

/// Restore from LKG or factory through the same commit protocol.
pub fn restore<S: Storage>(
    store: &mut SlotStore<S>,
    mailbox: &ProgramMailbox,
    source: RestoreSource,
    profile: &HardwareProfile,
) -> Result<()> {
    let slot = match source {
        RestoreSource::Lkg => Slot::Lkg,
        RestoreSource::Factory => Slot::Factory,
    };
    let candidate = store.read_envelope(slot)?;
    commit_candidate(store, mailbox, candidate, profile)
}

// ───────────────────────────────────────────────────────────────
// Compilation
// ───────────────────────────────────────────────────────────────

/// Compile a validated envelope into a program arena. Cards are sorted
/// into ascending-id (scan) order, durations are quantized to scans,
/// and every reference becomes a positional index.
pub fn compile(envelope: &ConfigEnvelope) -> Program {
    let mut sorted: Vec<&crate::config::CardConfig> = envelope.cards.iter().collect();
    sorted.sort_by_key(|card| card.card_id);

    let index_of = |card_id: u32| sorted.iter().position(|card| card.card_id == card_id);
    let interval_ms = envelope.scan.interval_ms;

    let cards = sorted
        .iter()
        .map(|cfg| {
            let timing = match &cfg.behavior {
                CardBehavior::Di(di) => CardTiming::Di {
                    debounce_scans: centi::duration_scans(di.debounce_time, interval_ms),
                },
                CardBehavior::Sio(sio) => {
                    CardTiming::Mission(MissionTiming::resolve(&sio.mission, interval_ms))
                }
                CardBehavior::Do(out) => {
                    CardTiming::Mission(MissionTiming::resolve(&out.mission, interval_ms))
                }
                _ => CardTiming::None,
            };

            let operands = match &cfg.behavior {
                CardBehavior::Math(math) => match (&math.standard, &math.pid) {
                    (Some(std_cfg), _) => OperandSet::Standard {
                        a: resolve_operand(
                            &std_cfg.input_a,
                            cfg.card_id,
                            ParamPath::MathInputA,
                            &envelope.bindings,
                            &index_of,
                        ),
                        b: resolve_operand(
                            &std_cfg.input_b,
                            cfg.card_id,
                            ParamPath::MathInputB,
                            &envelope.bindings,
                            &index_of,
                        ),
                    },
                    (_, Some(pid)) => OperandSet::Pid {
                        setpoint: resolve_operand(
                            &pid.setpoint,
                            cfg.card_id,
                            ParamPath::PidSetpoint,
                            &envelope.bindings,
                            &index_of,
                        ),
                        process: resolve_operand(
                            &pid.process_variable,
                            cfg.card_id,
                            ParamPath::PidProcessVariable,
                            &envelope.bindings,
                            &index_of,
                        ),
                    },
                    _ => OperandSet::None,
                },
                _ => OperandSet::None,
            };

            CompiledCard {
                id: cfg.card_id,
                enabled: cfg.enabled,
                label: cfg.label.clone(),
                fault_policy: cfg.fault_policy,
                behavior: cfg.behavior.clone(),
                timing,
                operands,
                common: CardCommon::default(),
                runtime: FamilyRuntime::for_behavior(&cfg.behavior),
            }
        })
        .collect();

    Program {
        envelope: envelope.clone(),
        settings: envelope.scan.clone(),
        cards,
    }
}

/// An explicit binding for `(card, path)` overrides the inline operand.
fn resolve_operand(
    inline: &BindSource,
    card_id: u32,
    path: ParamPath,
    bindings: &[Binding],
    index_of: &impl Fn(u32) -> Option<usize>,
) -> Operand {
    let source = bindings
        .iter()
        .find(|b| b.target.card_id == card_id && ParamPath::parse(&b.target.path) == Some(path))
        .map(|b| &b.source)
        .unwrap_or(inline);

    match source {
        BindSource::Constant { value } => Operand::Constant(*value),
        BindSource::VariableRef { reference } => match index_of(reference.card_id) {
            Some(position) => Operand::Card(position),
            // Unresolvable refs are rejected at validation; a total
            // compile maps them to an inert constant.
            None => Operand::Constant(0),
        },
    }
}
