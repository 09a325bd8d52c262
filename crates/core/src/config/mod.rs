//! Configuration for the liquidity watcher.
//!
//! This module provides:
//! - Watcher runtime configuration (chain, thresholds, schedule)
//! - `${VAR}` environment expansion applied to the TOML text before parsing

mod env;
mod watcher;

pub use env::expand_env;
pub use watcher::{
    ChainSettings, ScheduleConfig, Thresholds, WatcherConfig, CONFIG_PATH_ENV,
    DEFAULT_CONFIG_PATH,
};
