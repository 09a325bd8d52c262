//! Per-position threshold state machine.
//!
//! Each position carries two baselines. The report baseline re-centers every
//! time a report fires. The removal baseline re-centers when a withdrawal is
//! requested, and is also cleared on a long wall-clock period by the
//! scheduler; a cleared removal baseline is re-seeded from the next
//! observation without firing.
//!
//! Percent tests are strict and always measured against the baseline, never
//! against the previous poll.

use smallvec::SmallVec;

use crate::config::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => f.write_str("UP"),
            Direction::Down => f.write_str("DOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdEvent {
    /// Value moved past the report threshold.
    Changed {
        direction: Direction,
        value: f64,
        /// Value seen on the previous poll
        previous: f64,
    },
    /// Value moved past a removal threshold; the position should be withdrawn.
    WithdrawRequested {
        direction: Direction,
        baseline: f64,
        value: f64,
        percent: f64,
    },
}

/// At most one report and one withdrawal per observation.
pub type Events = SmallVec<[ThresholdEvent; 2]>;

/// `(prev - cur) > prev * pct / 100`
#[inline]
pub fn is_percent_down(prev: f64, cur: f64, pct: f64) -> bool {
    prev - cur > prev * pct / 100.0
}

/// `(cur - prev) > prev * pct / 100`
#[inline]
pub fn is_percent_up(prev: f64, cur: f64, pct: f64) -> bool {
    cur - prev > prev * pct / 100.0
}

/// Direction in which `cur` crossed `pct` percent away from `baseline`, if any.
pub fn crossing(baseline: f64, cur: f64, pct: f64) -> Option<Direction> {
    if is_percent_down(baseline, cur, pct) {
        Some(Direction::Down)
    } else if is_percent_up(baseline, cur, pct) {
        Some(Direction::Up)
    } else {
        None
    }
}

/// Baselines and markers for one position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    pub report_baseline: f64,
    /// `None` after a periodic reset until the next observation
    pub removal_baseline: Option<f64>,
    pub last_value: f64,
    /// Full report line already logged since the last report tick
    pub reported: bool,
}

impl PositionState {
    /// State for a first-seen position: every baseline is the first value.
    pub fn seeded(value: f64) -> Self {
        Self {
            report_baseline: value,
            removal_baseline: Some(value),
            last_value: value,
            reported: false,
        }
    }

    /// Compare a new value against both baselines and re-center those that fired.
    pub fn evaluate(&mut self, value: f64, thresholds: &Thresholds) -> Events {
        let mut events = Events::new();

        let report_pct = thresholds.percent_report_change;
        if let Some(direction) = crossing(self.report_baseline, value, report_pct) {
            events.push(ThresholdEvent::Changed {
                direction,
                value,
                previous: self.last_value,
            });
            self.report_baseline = value;
        }

        match self.removal_baseline {
            None => self.removal_baseline = Some(value),
            Some(baseline) => {
                if let Some((direction, percent)) = removal_crossing(baseline, value, thresholds) {
                    events.push(ThresholdEvent::WithdrawRequested {
                        direction,
                        baseline,
                        value,
                        percent,
                    });
                    self.removal_baseline = Some(value);
                }
            }
        }

        self.last_value = value;
        events
    }
}

fn removal_crossing(
    baseline: f64,
    value: f64,
    thresholds: &Thresholds,
) -> Option<(Direction, f64)> {
    let down = thresholds.percent_down_remove_liquidity;
    if is_percent_down(baseline, value, down) {
        return Some((Direction::Down, down));
    }
    match thresholds.percent_up_remove_liquidity {
        Some(up) if is_percent_up(baseline, value, up) => Some((Direction::Up, up)),
        _ => None,
    }
}
