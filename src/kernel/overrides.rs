//! Runtime override table: force, mask, breakpoint.
//!
//! Overrides are commissioning aids held in a structure parallel to
//! the compiled program, keyed by card position. They never touch
//! configuration — a commit or restore leaves stored bytes unchanged
//! regardless of what is forced or masked — and they survive a config
//! swap for cards whose id persists.

use crate::kernel::commands::InputForce;

/// Per-card override slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardOverride {
    pub force: InputForce,
    /// Local output mask (DO: suppresses the physical drive).
    pub masked: bool,
    /// Halt before evaluating this card in BREAKPOINT mode.
    pub breakpoint: bool,
}

impl Default for CardOverride {
    fn default() -> Self {
        Self {
            force: InputForce::Real,
            masked: false,
            breakpoint: false,
        }
    }
}

/// The full override table, sized at commit.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: Vec<CardOverride>,
    pub output_mask_global: bool,
}

impl OverrideTable {
    pub fn sized_for(card_count: usize) -> Self {
        Self {
            entries: vec![CardOverride::default(); card_count],
            output_mask_global: false,
        }
    }

    pub fn get(&self, position: usize) -> CardOverride {
        self.entries.get(position).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut CardOverride> {
        self.entries.get_mut(position)
    }

    /// Any input force engaged anywhere (drives `testMode.inputsForced`).
    pub fn any_force_active(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.force != InputForce::Real)
    }

    /// Rebuild for a new program, preserving overrides of surviving
    /// cards. `old_ids` / `new_ids` are the card ids in program order.
    pub fn carry_over(&self, old_ids: &[u32], new_ids: &[u32]) -> Self {
        let mut next = Self::sized_for(new_ids.len());
        next.output_mask_global = self.output_mask_global;
        for (new_pos, id) in new_ids.iter().enumerate() {
            if let Some(old_pos) = old_ids.iter().position(|old| old == id) {
                if let Some(entry) = self.entries.get(old_pos) {
                    next.entries[new_pos] = *entry;
                }
            }
        }
        next
    }
}
