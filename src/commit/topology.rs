//! Dependency graph construction and cycle detection.
//!
//! Edges run from a source card to the card that consumes its value,
//! whether through a condition clause, an inline MATH operand, or a
//! binding. A single back-reference (consumer id below source id) is
//! legal — it reads the previous scan — but any directed cycle,
//! self-references included, is rejected: a cycle has no scan order in
//! which its values are ever coherent.
//!
//! Evaluation order itself is never derived from this graph; it is
//! ascending card id by contract. The graph exists solely to prohibit
//! cycles.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{BindSource, CardBehavior, ConfigEnvelope};

/// Directed dependency edges, source → consumers.
type Adjacency = BTreeMap<u32, BTreeSet<u32>>;

/// Find a dependency cycle, if any. Returns the card ids along one
/// cycle, starting and ending at the same card.
pub fn find_cycle(envelope: &ConfigEnvelope) -> Option<Vec<u32>> {
    let known: BTreeSet<u32> = envelope.cards.iter().map(|c| c.card_id).collect();
    let mut edges: Adjacency = BTreeMap::new();
    let mut add_edge = |source: u32, consumer: u32| {
        // Dangling references are a resolution error, not a cycle.
        if known.contains(&source) && known.contains(&consumer) {
            edges.entry(source).or_default().insert(consumer);
        }
    };

    for card in &envelope.cards {
        let consumer = card.card_id;
        let (set, reset) = match &card.behavior {
            CardBehavior::Di(cfg) => (cfg.set.as_ref(), cfg.reset.as_ref()),
            CardBehavior::Sio(cfg) => (cfg.mission.set.as_ref(), cfg.mission.reset.as_ref()),
            CardBehavior::Do(cfg) => (cfg.mission.set.as_ref(), cfg.mission.reset.as_ref()),
            CardBehavior::Math(cfg) => (cfg.set.as_ref(), cfg.reset.as_ref()),
            CardBehavior::Ai(_) | CardBehavior::Rtc(_) => (None, None),
        };
        for block in [set, reset].into_iter().flatten() {
            add_edge(block.clause_a.source.card_id, consumer);
            if let Some(clause_b) = &block.clause_b {
                add_edge(clause_b.source.card_id, consumer);
            }
        }
        if let CardBehavior::Math(cfg) = &card.behavior {
            let operands = cfg
                .standard
                .iter()
                .flat_map(|s| [&s.input_a, &s.input_b])
                .chain(cfg.pid.iter().flat_map(|p| [&p.setpoint, &p.process_variable]));
            for operand in operands {
                if let BindSource::VariableRef { reference } = operand {
                    add_edge(reference.card_id, consumer);
                }
            }
        }
    }

    for binding in &envelope.bindings {
        if let BindSource::VariableRef { reference } = &binding.source {
            add_edge(reference.card_id, binding.target.card_id);
        }
    }

    dfs_cycle(&edges)
}

/// Three-color DFS over the adjacency; returns one cycle when found.
fn dfs_cycle(edges: &Adjacency) -> Option<Vec<u32>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: BTreeMap<u32, Color> = edges.keys().map(|&n| (n, Color::White)).collect();
    for targets in edges.values() {
        for &t in targets {
            color.entry(t).or_insert(Color::White);
        }
    }

    fn visit(
        node: u32,
        edges: &Adjacency,
        color: &mut BTreeMap<u32, Color>,
        stack: &mut Vec<u32>,
    ) -> Option<Vec<u32>> {
        color.insert(node, Color::Gray);
        stack.push(node);
        if let Some(targets) = edges.get(&node) {
            for &next in targets {
                match color.get(&next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        // Found the back edge: slice out the cycle.
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = visit(next, edges, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    let nodes: Vec<u32> = color.keys().copied().collect();
    let mut stack = Vec::new();
    for node in nodes {
        if color[&node] == Color::White {
            if let Some(cycle) = visit(node, edges, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::math::{MathConfig, MathMode, MathOp, StandardConfig};
    use crate::config::{
        Binding, BindSource, BindTarget, CardConfig, ConfigEnvelope, FaultPolicy, VarRef,
    };

    fn math_card(id: u32, input_b_ref: Option<u32>) -> CardConfig {
        CardConfig {
            card_id: id,
            enabled: true,
            label: format!("MATH {id}"),
            fault_policy: FaultPolicy::Warn,
            behavior: CardBehavior::Math(MathConfig {
                mode: MathMode::StandardPipeline,
                unit: Default::default(),
                fallback_value: 0,
                set: None,
                reset: None,
                standard: Some(StandardConfig {
                    input_a: BindSource::Constant { value: 100 },
                    input_b: match input_b_ref {
                        Some(source) => BindSource::VariableRef {
                            reference: VarRef { card_id: source },
                        },
                        None => BindSource::Constant { value: 100 },
                    },
                    operator: MathOp::Add,
                    rate_limit: 0,
                    clamp_min: 0,
                    clamp_max: 0,
                    scale_min: 0,
                    scale_max: 0,
                    ema_alpha: 100,
                }),
                pid: None,
            }),
        }
    }

    fn envelope(cards: Vec<CardConfig>) -> ConfigEnvelope {
        ConfigEnvelope {
            cards,
            ..ConfigEnvelope::factory()
        }
    }

    #[test]
    fn straight_chain_is_acyclic() {
        let env = envelope(vec![
            math_card(20, None),
            math_card(21, Some(20)),
            math_card(22, Some(21)),
        ]);
        assert_eq!(find_cycle(&env), None);
    }

    #[test]
    fn back_reference_alone_is_legal() {
        // Card 20 reads card 21 (previous-scan value): one edge, no cycle.
        let env = envelope(vec![math_card(20, Some(21)), math_card(21, None)]);
        assert_eq!(find_cycle(&env), None);
    }

    #[test]
    fn mutual_reference_is_a_cycle() {
        let env = envelope(vec![math_card(20, Some(21)), math_card(21, Some(20))]);
        let cycle = find_cycle(&env).expect("cycle");
        assert!(cycle.contains(&20) && cycle.contains(&21));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let env = envelope(vec![math_card(20, Some(20))]);
        assert!(find_cycle(&env).is_some());
    }

    #[test]
    fn binding_edges_participate() {
        let mut env = envelope(vec![math_card(20, Some(21)), math_card(21, None)]);
        env.bindings.push(Binding {
            binding_id: 1,
            target: BindTarget {
                card_id: 21,
                path: "math.inputB".to_string(),
            },
            source: BindSource::VariableRef {
                reference: VarRef { card_id: 20 },
            },
        });
        assert!(find_cycle(&env).is_some());
    }

    #[test]
    fn dangling_reference_is_not_a_cycle() {
        let env = envelope(vec![math_card(20, Some(99))]);
        assert_eq!(find_cycle(&env), None);
    }
}
