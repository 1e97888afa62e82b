//! Compiled program arena.
//!
//! The commit pipeline turns a validated envelope into a `Program`:
//! flat arrays of cards in ascending-id order with durations quantized
//! to scans and binding references resolved to positional indices.
//! References are plain integers, so the atomic swap at a scan
//! boundary is a handle exchange and the scan path never chases
//! pointers or allocates.

use crate::card::condition::{ConditionBlock, FieldReader, FieldValue, SourceField};
use crate::card::mission::MissionTiming;
use crate::card::{CardCommon, FamilyRuntime};
use crate::config::{CardBehavior, CardType, ConfigEnvelope, FaultPolicy, ScanSettings};

/// Family timing resolved to whole scans at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardTiming {
    None,
    Di { debounce_scans: u32 },
    Mission(MissionTiming),
}

/// A binding source resolved to a constant or a card position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Constant(u32),
    /// Position (not id) of the source card in the program.
    Card(usize),
}

/// Resolved operands for a MATH card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSet {
    None,
    Standard { a: Operand, b: Operand },
    Pid { setpoint: Operand, process: Operand },
}

/// One card with its compiled metadata and live runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCard {
    pub id: u32,
    pub enabled: bool,
    pub label: String,
    pub fault_policy: FaultPolicy,
    pub behavior: CardBehavior,
    pub timing: CardTiming,
    pub operands: OperandSet,
    pub common: CardCommon,
    pub runtime: FamilyRuntime,
}

impl CompiledCard {
    pub fn card_type(&self) -> CardType {
        self.behavior.card_type()
    }

    /// Set/reset blocks for families that carry them.
    pub fn condition_blocks(&self) -> (Option<&ConditionBlock>, Option<&ConditionBlock>) {
        match &self.behavior {
            CardBehavior::Di(cfg) => (cfg.set.as_ref(), cfg.reset.as_ref()),
            CardBehavior::Sio(cfg) => (cfg.mission.set.as_ref(), cfg.mission.reset.as_ref()),
            CardBehavior::Do(cfg) => (cfg.mission.set.as_ref(), cfg.mission.reset.as_ref()),
            CardBehavior::Math(cfg) => (cfg.set.as_ref(), cfg.reset.as_ref()),
            CardBehavior::Ai(_) | CardBehavior::Rtc(_) => (None, None),
        }
    }

    /// The numeric `currentValue` this card publishes, if any.
    pub fn current_value(&self) -> Option<u32> {
        match &self.runtime {
            FamilyRuntime::Di(rt) => Some(rt.current_value),
            FamilyRuntime::Ai(rt) => Some(rt.current_value),
            FamilyRuntime::Sio(rt) => Some(rt.current_value),
            FamilyRuntime::Do(rt) => Some(rt.mission.current_value),
            FamilyRuntime::Math(rt) => Some(rt.current_value),
            FamilyRuntime::Rtc(_) => None,
        }
    }
}

/// The active evaluation graph. Cards are strictly ascending by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub envelope: ConfigEnvelope,
    pub settings: ScanSettings,
    pub cards: Vec<CompiledCard>,
}

impl Program {
    /// An empty program running at the given settings (pre-commit boot).
    pub fn empty() -> Self {
        let envelope = ConfigEnvelope::factory();
        let settings = envelope.scan.clone();
        Self {
            envelope,
            settings,
            cards: Vec::new(),
        }
    }

    /// Position of a card by id.
    pub fn index_of(&self, card_id: u32) -> Option<usize> {
        self.cards.binary_search_by_key(&card_id, |c| c.id).ok()
    }

    /// Card ids in program (scan) order.
    pub fn card_ids(&self) -> Vec<u32> {
        self.cards.iter().map(|c| c.id).collect()
    }

    /// Resolve an operand against the in-progress scan.
    pub fn operand_value(&self, operand: Operand) -> Option<u32> {
        match operand {
            Operand::Constant(value) => Some(value),
            Operand::Card(position) => {
                let card = self.cards.get(position)?;
                if !card.enabled {
                    return None;
                }
                card.current_value()
            }
        }
    }

    /// Carry over runtime state from the previous program for cards
    /// whose id and family are unchanged. Edge memory, counters, EMA
    /// accumulators and fault bookkeeping all survive the swap.
    pub fn adopt_runtime(&mut self, prev: &Program) {
        for card in &mut self.cards {
            if let Some(prev_pos) = prev.index_of(card.id) {
                let prev_card = &prev.cards[prev_pos];
                if prev_card.card_type() == card.card_type() {
                    card.runtime = prev_card.runtime.clone();
                    card.common = prev_card.common.clone();
                }
            }
        }
    }
}

impl FieldReader for Program {
    fn read_field(&self, card_id: u32, field: SourceField) -> Option<FieldValue> {
        let card = &self.cards[self.index_of(card_id)?];
        if !card.enabled {
            return None;
        }
        match (&card.runtime, field) {
            (FamilyRuntime::Di(rt), SourceField::LogicalState) => {
                Some(FieldValue::Bool(rt.logical_state))
            }
            (FamilyRuntime::Di(rt), SourceField::PhysicalState) => {
                Some(FieldValue::Bool(rt.physical_state))
            }
            (FamilyRuntime::Di(rt), SourceField::TriggerFlag) => {
                Some(FieldValue::Bool(rt.trigger_flag))
            }
            (FamilyRuntime::Di(rt), SourceField::CurrentValue) => {
                Some(FieldValue::Number(rt.current_value))
            }

            (FamilyRuntime::Ai(rt), SourceField::CurrentValue) => {
                Some(FieldValue::Number(rt.current_value))
            }

            (FamilyRuntime::Sio(rt), SourceField::LogicalState) => {
                Some(FieldValue::Bool(rt.logical_state))
            }
            (FamilyRuntime::Sio(rt), SourceField::PhysicalState) => {
                Some(FieldValue::Bool(rt.physical_state))
            }
            (FamilyRuntime::Sio(rt), SourceField::TriggerFlag) => {
                Some(FieldValue::Bool(rt.trigger_flag))
            }
            (FamilyRuntime::Sio(rt), SourceField::CurrentValue) => {
                Some(FieldValue::Number(rt.current_value))
            }
            (FamilyRuntime::Sio(rt), SourceField::MissionState) => {
                Some(FieldValue::State(rt.mission_state() as u8))
            }

            (FamilyRuntime::Do(rt), SourceField::LogicalState) => {
                Some(FieldValue::Bool(rt.mission.logical_state))
            }
            (FamilyRuntime::Do(rt), SourceField::PhysicalState) => {
                Some(FieldValue::Bool(rt.mission.physical_state))
            }
            (FamilyRuntime::Do(rt), SourceField::TriggerFlag) => {
                Some(FieldValue::Bool(rt.mission.trigger_flag))
            }
            (FamilyRuntime::Do(rt), SourceField::CurrentValue) => {
                Some(FieldValue::Number(rt.mission.current_value))
            }
            (FamilyRuntime::Do(rt), SourceField::MissionState) => {
                Some(FieldValue::State(rt.mission.mission_state() as u8))
            }

            (FamilyRuntime::Math(rt), SourceField::CurrentValue) => {
                Some(FieldValue::Number(rt.current_value))
            }

            (FamilyRuntime::Rtc(rt), SourceField::LogicalState) => {
                Some(FieldValue::Bool(rt.logical_state))
            }

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::di::{DiConfig, DiRuntime, EdgeMode};
    use crate::card::math::MathRuntime;

    fn di_card(id: u32, counter: u32) -> CompiledCard {
        let mut runtime = DiRuntime::default();
        runtime.current_value = counter;
        CompiledCard {
            id,
            enabled: true,
            label: format!("DI {id}"),
            fault_policy: FaultPolicy::Warn,
            behavior: CardBehavior::Di(DiConfig {
                channel: 0,
                invert: false,
                debounce_time: 0,
                edge_mode: EdgeMode::Rising,
                set: None,
                reset: None,
                counter_visible: false,
            }),
            timing: CardTiming::Di { debounce_scans: 1 },
            operands: OperandSet::None,
            common: CardCommon::default(),
            runtime: FamilyRuntime::Di(runtime),
        }
    }

    fn program(cards: Vec<CompiledCard>) -> Program {
        Program {
            envelope: ConfigEnvelope::factory(),
            settings: ScanSettings::default(),
            cards,
        }
    }

    #[test]
    fn index_of_uses_ascending_ids() {
        let prog = program(vec![di_card(5, 0), di_card(10, 0), di_card(42, 0)]);
        assert_eq!(prog.index_of(10), Some(1));
        assert_eq!(prog.index_of(7), None);
    }

    #[test]
    fn disabled_card_reads_as_missing() {
        let mut prog = program(vec![di_card(5, 3)]);
        assert!(prog.read_field(5, SourceField::CurrentValue).is_some());
        prog.cards[0].enabled = false;
        assert!(prog.read_field(5, SourceField::CurrentValue).is_none());
    }

    #[test]
    fn operand_resolution() {
        let prog = program(vec![di_card(5, 7)]);
        assert_eq!(prog.operand_value(Operand::Constant(42)), Some(42));
        assert_eq!(prog.operand_value(Operand::Card(0)), Some(7));
        assert_eq!(prog.operand_value(Operand::Card(9)), None);
    }

    #[test]
    fn adopt_preserves_matching_cards_only() {
        let mut old = program(vec![di_card(5, 11), di_card(10, 22)]);
        old.cards[0].common.fault_count = 3;

        let mut new = program(vec![di_card(5, 0), di_card(10, 0)]);
        // Card 10 changes family in the new config.
        new.cards[1] = CompiledCard {
            behavior: CardBehavior::Math(crate::card::math::MathConfig {
                mode: crate::card::math::MathMode::StandardPipeline,
                unit: Default::default(),
                fallback_value: 0,
                set: None,
                reset: None,
                standard: None,
                pid: None,
            }),
            runtime: FamilyRuntime::Math(MathRuntime::default()),
            ..new.cards[1].clone()
        };

        new.adopt_runtime(&old);

        match &new.cards[0].runtime {
            FamilyRuntime::Di(rt) => assert_eq!(rt.current_value, 11),
            other => panic!("unexpected runtime {other:?}"),
        }
        assert_eq!(new.cards[0].common.fault_count, 3);

        // Family changed: fresh runtime.
        match &new.cards[1].runtime {
            FamilyRuntime::Math(rt) => assert_eq!(rt.current_value, 0),
            other => panic!("unexpected runtime {other:?}"),
        }
    }
}
