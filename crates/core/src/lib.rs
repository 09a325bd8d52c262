//! Liquidity watcher core logic.
//!
//! This crate provides the watcher's decision making on top of a
//! [`watcher_chain::LiquidityClient`]:
//! - Position valuation in a chosen value currency
//! - Per-position report and removal thresholds
//! - Portfolio totals
//! - The persisted pool registry
//! - The poll scheduler that ties them together

pub mod config;
mod error;
mod portfolio;
mod position_tracker;
mod registry;
mod retry;
mod scheduler;
mod threshold;
mod valuation;

#[cfg(test)]
mod testing;

pub use error::{RegistryError, RegistryResult, ValuationError, ValuationResult};
pub use portfolio::{PortfolioAggregator, PortfolioReport, ReportReason};
pub use position_tracker::{Observation, PositionTracker};
pub use registry::PositionRegistry;
pub use retry::{with_retry, RetryPolicy, Retryable};
pub use scheduler::{CycleReport, Watcher, WatcherSettings};
pub use threshold::{
    crossing, is_percent_down, is_percent_up, Direction, Events, PositionState, ThresholdEvent,
};
pub use valuation::{proportional_amounts, value_position, PositionSnapshot};
