//! Set/reset condition algebra.
//!
//! A condition block is at most two typed clauses joined by a
//! combiner. Evaluation is a pure function over a field reader —
//! the kernel supplies a reader backed by the in-progress scan, so a
//! clause referencing an earlier card (smaller id) sees that card's
//! fresh runtime and a reference to a later card sees its
//! previous-scan value.
//!
//! A card with no set block behaves as if the set condition were
//! always true; a card with no reset block never resets.

use serde::{Deserialize, Serialize};

// ───────────────────────────────────────────────────────────────
// Types
// ───────────────────────────────────────────────────────────────

/// How the two clauses of a block are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Combiner {
    /// Use clause A only; clause B must be absent.
    #[default]
    None,
    And,
    Or,
}

/// Comparison operators. Numbers accept all six; booleans accept
/// EQ/NEQ; mission states accept EQ only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// Declared type of a referenced field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Bool,
    Number,
    State,
}

/// Runtime fields a clause may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceField {
    LogicalState,
    PhysicalState,
    TriggerFlag,
    CurrentValue,
    MissionState,
}

impl SourceField {
    /// The value type this field carries.
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::LogicalState | Self::PhysicalState | Self::TriggerFlag => ValueType::Bool,
            Self::CurrentValue => ValueType::Number,
            Self::MissionState => ValueType::State,
        }
    }
}

/// A typed reference into another card's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub card_id: u32,
    pub field: SourceField,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

/// One comparison: `source.field <operator> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    pub source: SourceRef,
    pub operator: Operator,
    /// Centiunits for numbers, 0/1 for booleans, the mission-state
    /// ordinal (IDLE=0, ACTIVE=1, FINISHED=2) for states.
    pub threshold: u32,
}

/// A two-clause condition block. `clause_b` exists iff the combiner is
/// not NONE (enforced at commit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBlock {
    pub clause_a: Clause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause_b: Option<Clause>,
    #[serde(default)]
    pub combiner: Combiner,
}

// ───────────────────────────────────────────────────────────────
// Evaluation
// ───────────────────────────────────────────────────────────────

/// A typed runtime value read out of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Number(u32),
    /// Mission-state ordinal.
    State(u8),
}

/// Read access to card runtime fields during a scan.
///
/// Returns `None` for a missing card, a disabled card, or a field the
/// target family does not publish; the clause then evaluates to false.
/// Such configurations are rejected at commit, so `None` only occurs
/// transiently around a swap.
pub trait FieldReader {
    fn read_field(&self, card_id: u32, field: SourceField) -> Option<FieldValue>;
}

impl ConditionBlock {
    /// Evaluate the block. Short-circuits across the combiner.
    pub fn eval(&self, reader: &impl FieldReader) -> bool {
        let a = eval_clause(&self.clause_a, reader);
        match (self.combiner, self.clause_b.as_ref()) {
            (Combiner::None, _) => a,
            (Combiner::And, Some(b)) => a && eval_clause(b, reader),
            (Combiner::Or, Some(b)) => a || eval_clause(b, reader),
            // Shape violations are rejected at commit; fail closed.
            (Combiner::And, None) | (Combiner::Or, None) => false,
        }
    }
}

/// Evaluate an optional set block: absent means always true.
pub fn eval_set(block: Option<&ConditionBlock>, reader: &impl FieldReader) -> bool {
    block.map_or(true, |b| b.eval(reader))
}

/// Evaluate an optional reset block: absent means never.
pub fn eval_reset(block: Option<&ConditionBlock>, reader: &impl FieldReader) -> bool {
    block.is_some_and(|b| b.eval(reader))
}

fn eval_clause(clause: &Clause, reader: &impl FieldReader) -> bool {
    let Some(value) = reader.read_field(clause.source.card_id, clause.source.field) else {
        return false;
    };

    match value {
        FieldValue::Bool(b) => {
            let want = clause.threshold != 0;
            match clause.operator {
                Operator::Eq => b == want,
                Operator::Neq => b != want,
                _ => false,
            }
        }
        FieldValue::Number(n) => match clause.operator {
            Operator::Gt => n > clause.threshold,
            Operator::Gte => n >= clause.threshold,
            Operator::Lt => n < clause.threshold,
            Operator::Lte => n <= clause.threshold,
            Operator::Eq => n == clause.threshold,
            Operator::Neq => n != clause.threshold,
        },
        FieldValue::State(ordinal) => match clause.operator {
            // Only equality is defined over mission states.
            Operator::Eq => u32::from(ordinal) == clause.threshold,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapReader(HashMap<(u32, SourceField), FieldValue>);

    impl FieldReader for MapReader {
        fn read_field(&self, card_id: u32, field: SourceField) -> Option<FieldValue> {
            self.0.get(&(card_id, field)).copied()
        }
    }

    fn number_clause(card_id: u32, operator: Operator, threshold: u32) -> Clause {
        Clause {
            source: SourceRef {
                card_id,
                field: SourceField::CurrentValue,
                value_type: ValueType::Number,
            },
            operator,
            threshold,
        }
    }

    fn bool_clause(card_id: u32, operator: Operator, threshold: u32) -> Clause {
        Clause {
            source: SourceRef {
                card_id,
                field: SourceField::LogicalState,
                value_type: ValueType::Bool,
            },
            operator,
            threshold,
        }
    }

    fn reader() -> MapReader {
        let mut m = HashMap::new();
        m.insert((1, SourceField::CurrentValue), FieldValue::Number(500));
        m.insert((2, SourceField::LogicalState), FieldValue::Bool(true));
        m.insert((3, SourceField::MissionState), FieldValue::State(1));
        MapReader(m)
    }

    #[test]
    fn numeric_operators() {
        let r = reader();
        let cases = [
            (Operator::Gt, 499, true),
            (Operator::Gt, 500, false),
            (Operator::Gte, 500, true),
            (Operator::Lt, 501, true),
            (Operator::Lte, 500, true),
            (Operator::Eq, 500, true),
            (Operator::Neq, 500, false),
        ];
        for (op, threshold, expected) in cases {
            let block = ConditionBlock {
                clause_a: number_clause(1, op, threshold),
                clause_b: None,
                combiner: Combiner::None,
            };
            assert_eq!(block.eval(&r), expected, "{op:?} {threshold}");
        }
    }

    #[test]
    fn bool_accepts_only_eq_neq() {
        let r = reader();
        let eq = ConditionBlock {
            clause_a: bool_clause(2, Operator::Eq, 1),
            clause_b: None,
            combiner: Combiner::None,
        };
        assert!(eq.eval(&r));

        let gt = ConditionBlock {
            clause_a: bool_clause(2, Operator::Gt, 0),
            clause_b: None,
            combiner: Combiner::None,
        };
        assert!(!gt.eval(&r));
    }

    #[test]
    fn state_accepts_only_eq() {
        let r = reader();
        let clause = Clause {
            source: SourceRef {
                card_id: 3,
                field: SourceField::MissionState,
                value_type: ValueType::State,
            },
            operator: Operator::Eq,
            threshold: 1,
        };
        let block = ConditionBlock {
            clause_a: clause,
            clause_b: None,
            combiner: Combiner::None,
        };
        assert!(block.eval(&r));

        let neq = ConditionBlock {
            clause_a: Clause {
                operator: Operator::Neq,
                ..clause
            },
            clause_b: None,
            combiner: Combiner::None,
        };
        assert!(!neq.eval(&r));
    }

    #[test]
    fn missing_reference_is_false() {
        let r = reader();
        let block = ConditionBlock {
            clause_a: number_clause(99, Operator::Gte, 0),
            clause_b: None,
            combiner: Combiner::None,
        };
        assert!(!block.eval(&r));
    }

    #[test]
    fn and_or_combiners() {
        let r = reader();
        let true_a = number_clause(1, Operator::Eq, 500);
        let false_b = number_clause(1, Operator::Eq, 0);

        let and = ConditionBlock {
            clause_a: true_a,
            clause_b: Some(false_b),
            combiner: Combiner::And,
        };
        assert!(!and.eval(&r));

        let or = ConditionBlock {
            clause_a: true_a,
            clause_b: Some(false_b),
            combiner: Combiner::Or,
        };
        assert!(or.eval(&r));
    }

    #[test]
    fn combiner_without_clause_b_fails_closed() {
        let r = reader();
        let block = ConditionBlock {
            clause_a: number_clause(1, Operator::Eq, 500),
            clause_b: None,
            combiner: Combiner::And,
        };
        assert!(!block.eval(&r));
    }

    #[test]
    fn absent_blocks_default_open_and_closed() {
        let r = reader();
        assert!(eval_set(None, &r));
        assert!(!eval_reset(None, &r));
    }
}
