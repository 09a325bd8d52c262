//! Watcher configuration.
//!
//! Loaded from a TOML file (path from `WATCHER_CONFIG`, default
//! `watcher.toml`). `${VAR}` patterns anywhere in the file are expanded from
//! the environment first, so secrets can stay in `.env`:
//!
//! ```toml
//! value_currency = "0x72Cb10C6bfA5624dD07Ef608027E366bd690048F"
//!
//! [chain]
//! private_key = "${PRIVATE_KEY}"
//!
//! [thresholds]
//! percent_down_remove_liquidity = 5.0
//! ```

use alloy::primitives::Address;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use watcher_chain::ClientConfig;

use super::env::expand_env;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "WATCHER_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "watcher.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Token every position is valued in
    #[serde(default = "default_value_currency")]
    pub value_currency: Address,

    /// Line-oriented `address,value` file of watched pairs
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_value_currency() -> Address {
    Address::ZERO
}
fn default_registry_path() -> PathBuf {
    PathBuf::from("pools.csv")
}

/// RPC, contracts and transaction settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,

    #[serde(default = "default_router")]
    pub router_address: Address,

    #[serde(default = "default_factory")]
    pub factory_address: Address,

    /// Gas price paid for withdrawals (gwei)
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: f64,

    /// When set, follow the node's gas price up to this cap (gwei)
    #[serde(default)]
    pub max_gas_price_gwei: Option<f64>,

    #[serde(default = "default_txn_timeout")]
    pub txn_timeout_secs: u64,

    #[serde(default)]
    pub private_key: String,

    /// Attempts for reads and withdrawals before a failure is surfaced
    #[serde(default = "default_rpc_attempts")]
    pub rpc_attempts: u32,

    /// Read from the node when absent
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default)]
    pub block_explorer_prefix: Option<String>,
}

fn default_rpc_endpoint() -> String {
    "https://api.harmony.one/".to_string()
}
fn default_router() -> Address {
    Address::new([
        0x24, 0xad, 0x62, 0x50, 0x2d, 0x1c, 0x65, 0x2c, 0xc7, 0x68, 0x40, 0x81, 0x16, 0x9d, 0x04,
        0x89, 0x6a, 0xc2, 0x0f, 0x30,
    ])
}
fn default_factory() -> Address {
    Address::new([
        0x90, 0x14, 0xb9, 0x37, 0x06, 0x99, 0x18, 0xbd, 0x31, 0x9f, 0x80, 0xe8, 0xb3, 0xbb, 0x4a,
        0x2c, 0xf6, 0xfa, 0xa5, 0xf7,
    ])
}
fn default_gas_price_gwei() -> f64 {
    30.0
}
fn default_txn_timeout() -> u64 {
    60
}
fn default_rpc_attempts() -> u32 {
    3
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_endpoint: default_rpc_endpoint(),
            router_address: default_router(),
            factory_address: default_factory(),
            gas_price_gwei: default_gas_price_gwei(),
            max_gas_price_gwei: None,
            txn_timeout_secs: default_txn_timeout(),
            private_key: String::new(),
            rpc_attempts: default_rpc_attempts(),
            chain_id: None,
            block_explorer_prefix: None,
        }
    }
}

impl ChainSettings {
    pub fn txn_timeout(&self) -> Duration {
        Duration::from_secs(self.txn_timeout_secs)
    }
}

// Manual impl keeps the private key out of logs
impl std::fmt::Debug for ChainSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSettings")
            .field("rpc_endpoint", &self.rpc_endpoint)
            .field("router_address", &self.router_address)
            .field("factory_address", &self.factory_address)
            .field("gas_price_gwei", &self.gas_price_gwei)
            .field("max_gas_price_gwei", &self.max_gas_price_gwei)
            .field("txn_timeout_secs", &self.txn_timeout_secs)
            .field("rpc_attempts", &self.rpc_attempts)
            .field("chain_id", &self.chain_id)
            .field("block_explorer_prefix", &self.block_explorer_prefix)
            .finish_non_exhaustive()
    }
}

/// Percent thresholds for reporting and withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Log a position (or the total) when it moves this much from its report baseline
    #[serde(default = "default_percent_report_change")]
    pub percent_report_change: f64,

    /// Withdraw when a position falls this much below its removal baseline
    #[serde(default = "default_percent_down_remove")]
    pub percent_down_remove_liquidity: f64,

    /// Withdraw when a position rises this much above its removal baseline
    #[serde(default)]
    pub percent_up_remove_liquidity: Option<f64>,
}

fn default_percent_report_change() -> f64 {
    3.0
}
fn default_percent_down_remove() -> f64 {
    5.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            percent_report_change: default_percent_report_change(),
            percent_down_remove_liquidity: default_percent_down_remove(),
            percent_up_remove_liquidity: None,
        }
    }
}

/// Poll loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Period of the full report of every position and the total
    #[serde(default = "default_report_all_every")]
    pub report_all_every_minutes: u64,

    /// Period after which every removal baseline is re-seeded
    #[serde(default = "default_removal_reset")]
    pub removal_baseline_reset_hours: u64,

    /// Pause after a position could not be valued
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_report_all_every() -> u64 {
    60
}
fn default_removal_reset() -> u64 {
    5
}
fn default_failure_backoff() -> u64 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            report_all_every_minutes: default_report_all_every(),
            removal_baseline_reset_hours: default_removal_reset(),
            failure_backoff_secs: default_failure_backoff(),
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
    pub fn report_all_every(&self) -> Duration {
        Duration::from_secs(self.report_all_every_minutes * 60)
    }
    pub fn removal_baseline_reset(&self) -> Duration {
        Duration::from_secs(self.removal_baseline_reset_hours * 3600)
    }
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            value_currency: default_value_currency(),
            registry_path: default_registry_path(),
            chain: ChainSettings::default(),
            thresholds: Thresholds::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Parse TOML text after expanding `${VAR}` patterns.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env(content);
        let config: Self = toml::from_str(&expanded).context("invalid watcher config")?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load from the file named by `WATCHER_CONFIG`, or `watcher.toml`.
    pub fn from_env() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    /// Reject settings the watcher cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.value_currency == Address::ZERO {
            bail!("value_currency must be set");
        }
        if self.chain.private_key.trim().is_empty() {
            bail!("chain.private_key must be set");
        }
        if self.chain.rpc_attempts == 0 {
            bail!("chain.rpc_attempts must be at least 1");
        }
        if self.chain.txn_timeout_secs == 0 {
            bail!("chain.txn_timeout_secs must be positive");
        }
        if self.chain.gas_price_gwei.is_nan() || self.chain.gas_price_gwei <= 0.0 {
            bail!("chain.gas_price_gwei must be positive");
        }

        let t = &self.thresholds;
        let percents = [
            ("thresholds.percent_report_change", Some(t.percent_report_change)),
            (
                "thresholds.percent_down_remove_liquidity",
                Some(t.percent_down_remove_liquidity),
            ),
            (
                "thresholds.percent_up_remove_liquidity",
                t.percent_up_remove_liquidity,
            ),
        ];
        for (name, value) in percents {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    bail!("{name} must be a non-negative percentage, got {v}");
                }
            }
        }

        let s = &self.schedule;
        if s.poll_interval_secs == 0 {
            bail!("schedule.poll_interval_secs must be positive");
        }
        if s.report_all_every_minutes == 0 {
            bail!("schedule.report_all_every_minutes must be positive");
        }
        if s.removal_baseline_reset_hours == 0 {
            bail!("schedule.removal_baseline_reset_hours must be positive");
        }
        Ok(())
    }

    /// Settings for the UniswapV2 chain client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            rpc_url: self.chain.rpc_endpoint.clone(),
            router: self.chain.router_address,
            factory: self.chain.factory_address,
            private_key: self.chain.private_key.clone(),
            chain_id: self.chain.chain_id,
            gas_price_gwei: self.chain.gas_price_gwei,
            max_gas_price_gwei: self.chain.max_gas_price_gwei,
            txn_timeout: self.chain.txn_timeout(),
            explorer_prefix: self.chain.block_explorer_prefix.clone(),
            withdraw_attempts: self.chain.rpc_attempts,
        }
    }

    /// Log the effective configuration (never the private key).
    pub fn log_config(&self) {
        tracing::info!(
            value_currency = %self.value_currency,
            registry = %self.registry_path.display(),
            "Watcher configuration loaded"
        );
        tracing::info!(
            rpc = %self.chain.rpc_endpoint,
            router = %self.chain.router_address,
            factory = %self.chain.factory_address,
            gas_price_gwei = self.chain.gas_price_gwei,
            max_gas_price_gwei = ?self.chain.max_gas_price_gwei,
            txn_timeout_secs = self.chain.txn_timeout_secs,
            rpc_attempts = self.chain.rpc_attempts,
            "Chain settings"
        );
        tracing::info!(
            report_change_pct = self.thresholds.percent_report_change,
            down_remove_pct = self.thresholds.percent_down_remove_liquidity,
            up_remove_pct = ?self.thresholds.percent_up_remove_liquidity,
            "Thresholds"
        );
        tracing::info!(
            poll_interval_secs = self.schedule.poll_interval_secs,
            report_all_every_minutes = self.schedule.report_all_every_minutes,
            removal_reset_hours = self.schedule.removal_baseline_reset_hours,
            failure_backoff_secs = self.schedule.failure_backoff_secs,
            "Schedule"
        );
    }
}
