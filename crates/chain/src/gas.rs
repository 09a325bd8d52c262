//! Gas pricing strategies for withdrawal transactions.
//!
//! UniswapV2 deployments on chains like Harmony still price transactions with
//! a single legacy `gas_price`, so both strategies produce one value in wei:
//!
//! ```rust,ignore
//! use watcher_chain::gas::create_gas_strategy;
//!
//! // Always pay the configured 30 gwei
//! let fixed = create_gas_strategy(30.0, None);
//!
//! // Follow eth_gasPrice, never above 100 gwei
//! let node = create_gas_strategy(30.0, Some(100.0));
//! ```

use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::error::ChainResult;
use crate::provider::parse_rpc_url;

const WEI_PER_GWEI: f64 = 1e9;

/// Trait for gas pricing strategies.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Gas price in wei to use for the next transaction.
    async fn gas_price(&self, rpc_url: &str) -> ChainResult<u128>;

    /// Apply a gas price to a transaction request.
    fn apply_gas(&self, tx: &mut TransactionRequest, gas_price: u128) {
        tx.set_gas_price(gas_price);
    }

    /// Get the strategy name for logging/debugging.
    fn strategy_name(&self) -> &'static str;
}

/// Pays a constant, configured gas price.
#[derive(Debug, Clone)]
pub struct FixedGasStrategy {
    gas_price: u128,
}

impl FixedGasStrategy {
    pub fn new(gas_price: u128) -> Self {
        Self { gas_price }
    }
}

#[async_trait]
impl GasStrategy for FixedGasStrategy {
    async fn gas_price(&self, _rpc_url: &str) -> ChainResult<u128> {
        Ok(self.gas_price)
    }

    fn strategy_name(&self) -> &'static str {
        "Fixed"
    }
}

/// Follows the node's `eth_gasPrice`, capped at a maximum.
///
/// Falls back to the last good price (initially the configured default) when
/// the node does not answer.
#[derive(Debug)]
pub struct NodeGasStrategy {
    max_gas_price: u128,
    cached_gas_price: AtomicU64,
}

impl NodeGasStrategy {
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        let initial = default_gas_price.min(max_gas_price);
        Self {
            max_gas_price,
            cached_gas_price: AtomicU64::new(initial as u64),
        }
    }

    pub fn cached_gas_price(&self) -> u128 {
        self.cached_gas_price.load(Ordering::Relaxed) as u128
    }

    /// Cap and remember a price reported by the node.
    pub fn update_cache(&self, gas_price: u128) -> u128 {
        let capped = gas_price.min(self.max_gas_price);
        self.cached_gas_price.store(capped as u64, Ordering::Relaxed);
        capped
    }
}

#[async_trait]
impl GasStrategy for NodeGasStrategy {
    async fn gas_price(&self, rpc_url: &str) -> ChainResult<u128> {
        let provider = ProviderBuilder::new().on_http(parse_rpc_url(rpc_url)?);
        match provider.get_gas_price().await {
            Ok(price) => Ok(self.update_cache(price)),
            Err(e) => {
                let fallback = self.cached_gas_price();
                warn!(
                    error = %e,
                    fallback_wei = fallback,
                    "eth_gasPrice failed, using cached price"
                );
                Ok(fallback)
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "Node"
    }
}

pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * WEI_PER_GWEI) as u128
}

/// Create a gas strategy from chain configuration.
///
/// Without a maximum the configured price is used as-is; with one, the node's
/// price is followed and capped.
pub fn create_gas_strategy(
    gas_price_gwei: f64,
    max_gas_price_gwei: Option<f64>,
) -> Box<dyn GasStrategy> {
    match max_gas_price_gwei {
        Some(max) => Box::new(NodeGasStrategy::new(
            gwei_to_wei(gas_price_gwei),
            gwei_to_wei(max),
        )),
        None => Box::new(FixedGasStrategy::new(gwei_to_wei(gas_price_gwei))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_create_gas_strategy() {
        let fixed = create_gas_strategy(30.0, None);
        assert_eq!(fixed.strategy_name(), "Fixed");

        let node = create_gas_strategy(30.0, Some(100.0));
        assert_eq!(node.strategy_name(), "Node");
    }

    #[tokio::test]
    async fn test_fixed_price_ignores_node() {
        let fixed = FixedGasStrategy::new(gwei_to_wei(30.0));
        let price = fixed.gas_price("http://127.0.0.1:1").await.unwrap();
        assert_eq!(price, 30_000_000_000);
    }

    #[test]
    fn test_node_cache_is_capped() {
        let strategy = NodeGasStrategy::new(1_000_000_000, 10_000_000_000);
        assert_eq!(strategy.cached_gas_price(), 1_000_000_000);

        assert_eq!(strategy.update_cache(5_000_000_000), 5_000_000_000);
        assert_eq!(strategy.update_cache(20_000_000_000), 10_000_000_000);
        assert_eq!(strategy.cached_gas_price(), 10_000_000_000);
    }

    #[test]
    fn test_default_above_max_starts_capped() {
        let strategy = NodeGasStrategy::new(50_000_000_000, 10_000_000_000);
        assert_eq!(strategy.cached_gas_price(), 10_000_000_000);
    }

    #[test]
    fn test_apply_gas_sets_legacy_price() {
        let strategy = FixedGasStrategy::new(5_000_000_000);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);
        strategy.apply_gas(&mut tx, 5_000_000_000);
        assert_eq!(tx.gas_price(), Some(5_000_000_000));
    }
}
