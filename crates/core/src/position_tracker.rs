//! Per-position state book.
//!
//! Owned by the scheduler and mutated from its single poll loop, so a plain
//! map is enough.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::config::Thresholds;
use crate::threshold::{Events, PositionState};

/// Outcome of feeding one valuation into the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// No state existed; baselines were seeded and no events fired
    pub first_seen: bool,
    pub events: Events,
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    states: HashMap<Address, PositionState>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new value for `pair`, seeding state on first sight.
    pub fn observe(&mut self, pair: Address, value: f64, thresholds: &Thresholds) -> Observation {
        match self.states.get_mut(&pair) {
            Some(state) => Observation {
                first_seen: false,
                events: state.evaluate(value, thresholds),
            },
            None => {
                self.states.insert(pair, PositionState::seeded(value));
                Observation {
                    first_seen: true,
                    events: Events::new(),
                }
            }
        }
    }

    /// Whether the full report line for `pair` is still due.
    pub fn needs_full_report(&self, pair: &Address) -> bool {
        self.states.get(pair).map_or(true, |s| !s.reported)
    }

    pub fn mark_reported(&mut self, pair: &Address) {
        if let Some(state) = self.states.get_mut(pair) {
            state.reported = true;
        }
    }

    /// Full-report tick: every position gets its full line again.
    pub fn clear_report_markers(&mut self) {
        for state in self.states.values_mut() {
            state.reported = false;
        }
    }

    /// Removal reset tick: every removal baseline is re-seeded on its next observation.
    pub fn reset_removal_baselines(&mut self) {
        for state in self.states.values_mut() {
            state.removal_baseline = None;
        }
    }

    pub fn remove(&mut self, pair: &Address) -> Option<PositionState> {
        self.states.remove(pair)
    }

    pub fn get(&self, pair: &Address) -> Option<&PositionState> {
        self.states.get(pair)
    }
}
