//! The chain capability set consumed by the watcher, and its UniswapV2
//! implementation.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::contracts::RouterContract;
use crate::error::{ChainError, ChainResult};
use crate::gas::create_gas_strategy;
use crate::provider::{ReadProvider, TokenMeta};
use crate::signer::TransactionSender;
use crate::units::{pow10, to_decimal};

/// UniswapV2 LP tokens always have 18 decimals.
pub const LP_DECIMALS: u8 = 18;

/// Concurrent factory reads while enumerating pairs.
const PAIR_SCAN_CONCURRENCY: usize = 16;

/// Raw state of one liquidity pair as seen by the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub token_a: Address,
    pub token_b: Address,
    pub reserve_a: U256,
    pub reserve_b: U256,
    pub decimals_a: u8,
    pub decimals_b: u8,
    /// Account's LP balance (raw)
    pub lp_balance: U256,
    /// LP total supply (raw)
    pub total_supply: U256,
    pub lp_decimals: u8,
}

/// Result of a withdrawal request that reached a conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub success: bool,
    pub tx_hash: Option<B256>,
}

impl WithdrawOutcome {
    pub fn confirmed(tx_hash: B256) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
        }
    }

    pub fn nothing_to_withdraw() -> Self {
        Self {
            success: false,
            tx_hash: None,
        }
    }
}

/// Chain operations the watcher needs.
///
/// Read calls surface their first failure; `withdraw_all` retries internally
/// before giving up.
#[async_trait]
pub trait LiquidityClient: Send + Sync {
    /// Account whose positions are watched.
    fn account(&self) -> Address;

    async fn resolve_symbol(&self, token: Address) -> ChainResult<String>;

    async fn pool_state(&self, pair: Address) -> ChainResult<PoolState>;

    /// Value of one whole unit of `token` in `value_token`.
    async fn quote_unit(&self, token: Address, value_token: Address) -> ChainResult<f64>;

    /// Remove all of the account's liquidity from `pair`.
    async fn withdraw_all(&self, pair: Address) -> ChainResult<WithdrawOutcome>;

    /// Pairs where the account holds LP tokens, in factory order.
    async fn list_positions_with_balance(&self) -> ChainResult<Vec<Address>>;
}

/// Settings for [`UniswapV2Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub router: Address,
    pub factory: Address,
    pub private_key: String,
    pub chain_id: Option<u64>,
    pub gas_price_gwei: f64,
    pub max_gas_price_gwei: Option<f64>,
    pub txn_timeout: Duration,
    pub explorer_prefix: Option<String>,
    /// Total withdrawal attempts before surfacing a failure
    pub withdraw_attempts: u32,
}

/// UniswapV2 router/factory client with per-token metadata caching.
pub struct UniswapV2Client {
    reader: ReadProvider,
    router: RouterContract,
    account: Address,
    withdraw_attempts: u32,
    tokens: DashMap<Address, TokenMeta>,
    pair_tokens: DashMap<Address, (Address, Address)>,
    weth: OnceCell<Option<Address>>,
}

impl UniswapV2Client {
    /// Connect to the node and initialise the transaction sender.
    pub async fn connect(config: ClientConfig) -> ChainResult<Self> {
        let reader = ReadProvider::connect(&config.rpc_url, config.router, config.factory).await?;

        let sender = TransactionSender::builder(config.rpc_url.clone())
            .chain_id(config.chain_id)
            .gas_strategy(create_gas_strategy(
                config.gas_price_gwei,
                config.max_gas_price_gwei,
            ))
            .txn_timeout(config.txn_timeout)
            .explorer_prefix(config.explorer_prefix.clone())
            .build(&config.private_key)
            .await?;
        let account = sender.address;

        info!(
            account = %account,
            router = %config.router,
            factory = %config.factory,
            withdraw_attempts = config.withdraw_attempts,
            "UniswapV2 client ready"
        );

        Ok(Self {
            reader,
            router: RouterContract::with_sender(config.router, Arc::new(sender)),
            account,
            withdraw_attempts: config.withdraw_attempts.max(1),
            tokens: DashMap::new(),
            pair_tokens: DashMap::new(),
            weth: OnceCell::new(),
        })
    }

    async fn token_meta(&self, token: Address) -> ChainResult<TokenMeta> {
        if let Some(meta) = self.tokens.get(&token) {
            return Ok(meta.clone());
        }
        let meta = self.reader.token_meta(token).await?;
        debug!(token = %token, symbol = %meta.symbol, decimals = meta.decimals, "Token resolved");
        self.tokens.insert(token, meta.clone());
        Ok(meta)
    }

    async fn tokens_of(&self, pair: Address) -> ChainResult<(Address, Address)> {
        if let Some(tokens) = self.pair_tokens.get(&pair) {
            return Ok(*tokens);
        }
        let tokens = self.reader.pair_tokens(pair).await?;
        self.pair_tokens.insert(pair, tokens);
        Ok(tokens)
    }

    /// Wrapped native token, used as the intermediate hop when no direct pair exists.
    async fn weth(&self) -> Option<Address> {
        *self
            .weth
            .get_or_init(|| async {
                match self.reader.weth().await {
                    Ok(addr) => Some(addr),
                    Err(e) => {
                        warn!(error = %e, "Router WETH() unavailable, quoting direct routes only");
                        None
                    }
                }
            })
            .await
    }

    async fn quote_path(&self, amount_in: U256, path: Vec<Address>) -> ChainResult<U256> {
        let amounts = self.reader.amounts_out(amount_in, path).await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| ChainError::Contract("getAmountsOut returned no amounts".to_string()))
    }

    async fn withdraw_once(&self, pair: Address) -> ChainResult<WithdrawOutcome> {
        let balance = self.reader.lp_balance(pair, self.account).await?;
        if balance.is_zero() {
            warn!(pair = %pair, "No LP balance to withdraw");
            return Ok(WithdrawOutcome::nothing_to_withdraw());
        }

        let allowance = self.reader.router_allowance(pair, self.account).await?;
        if allowance < balance {
            self.router.approve_pair(pair).await?;
        }

        let (token_a, token_b) = self.tokens_of(pair).await?;
        let tx_hash = self.router.remove_liquidity(token_a, token_b, balance).await?;
        Ok(WithdrawOutcome::confirmed(tx_hash))
    }
}

#[async_trait]
impl LiquidityClient for UniswapV2Client {
    fn account(&self) -> Address {
        self.account
    }

    async fn resolve_symbol(&self, token: Address) -> ChainResult<String> {
        Ok(self.token_meta(token).await?.symbol)
    }

    async fn pool_state(&self, pair: Address) -> ChainResult<PoolState> {
        let (token_a, token_b) = self.tokens_of(pair).await?;
        let (meta_a, meta_b, reading) = tokio::try_join!(
            self.token_meta(token_a),
            self.token_meta(token_b),
            self.reader.pair_reading(pair, self.account)
        )?;

        Ok(PoolState {
            token_a,
            token_b,
            reserve_a: reading.reserve0,
            reserve_b: reading.reserve1,
            decimals_a: meta_a.decimals,
            decimals_b: meta_b.decimals,
            lp_balance: reading.lp_balance,
            total_supply: reading.total_supply,
            lp_decimals: LP_DECIMALS,
        })
    }

    async fn quote_unit(&self, token: Address, value_token: Address) -> ChainResult<f64> {
        if token == value_token {
            return Ok(1.0);
        }

        let (meta_in, meta_out) =
            tokio::try_join!(self.token_meta(token), self.token_meta(value_token))?;
        let unit = pow10(meta_in.decimals);

        let raw = match self.quote_path(unit, vec![token, value_token]).await {
            Ok(raw) => raw,
            Err(direct_err) => match self.weth().await {
                Some(weth) if weth != token && weth != value_token => {
                    debug!(
                        token = %token,
                        error = %direct_err,
                        "Direct quote failed, routing through WETH"
                    );
                    self.quote_path(unit, vec![token, weth, value_token]).await?
                }
                _ => return Err(direct_err),
            },
        };

        Ok(to_decimal(raw, meta_out.decimals))
    }

    #[instrument(skip(self), fields(account = %self.account))]
    async fn withdraw_all(&self, pair: Address) -> ChainResult<WithdrawOutcome> {
        let base_delay = Duration::from_secs(2);
        let mut last_error = None;

        for attempt in 0..self.withdraw_attempts {
            if attempt > 0 {
                let delay = base_delay * (1 << (attempt - 1).min(4));
                info!(
                    pair = %pair,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying withdrawal after delay"
                );
                tokio::time::sleep(delay).await;
            }

            match self.withdraw_once(pair).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(
                        pair = %pair,
                        attempt = attempt + 1,
                        error = %e,
                        "Withdrawal attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChainError::Config("withdrawal attempts must be at least 1".into())))
    }

    async fn list_positions_with_balance(&self) -> ChainResult<Vec<Address>> {
        let count = self.reader.pair_count().await?;
        info!(pairs = count, account = %self.account, "Scanning factory for LP balances");

        let account = self.account;
        let reader = &self.reader;
        let found: Vec<Option<Address>> = stream::iter(0..count)
            .map(|index| async move {
                let pair = reader.pair_at(index).await?;
                let balance = reader.lp_balance(pair, account).await?;
                Ok::<_, ChainError>((pair, balance))
            })
            .buffered(PAIR_SCAN_CONCURRENCY)
            .enumerate()
            .map(|(index, result)| match result {
                Ok((pair, balance)) if !balance.is_zero() => Some(pair),
                Ok(_) => None,
                Err(e) => {
                    warn!(index = index, error = %e, "Skipping pair during scan");
                    None
                }
            })
            .collect()
            .await;

        let pairs: Vec<Address> = found.into_iter().flatten().collect();
        info!(positions = pairs.len(), "Factory scan complete");
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_outcome_constructors() {
        let hash = B256::repeat_byte(7);
        let ok = WithdrawOutcome::confirmed(hash);
        assert!(ok.success);
        assert_eq!(ok.tx_hash, Some(hash));

        let none = WithdrawOutcome::nothing_to_withdraw();
        assert!(!none.success);
        assert!(none.tx_hash.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires network and a funded key in WATCHER_TEST_KEY
    async fn test_client_reads_pool() {
        let key = std::env::var("WATCHER_TEST_KEY").unwrap();
        let client = UniswapV2Client::connect(ClientConfig {
            rpc_url: "https://api.harmony.one/".to_string(),
            router: "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506".parse().unwrap(),
            factory: "0xc35DADB65012eC5796536bD9864eD8773aBc74C4".parse().unwrap(),
            private_key: key,
            chain_id: None,
            gas_price_gwei: 30.0,
            max_gas_price_gwei: None,
            txn_timeout: Duration::from_secs(60),
            explorer_prefix: None,
            withdraw_attempts: 3,
        })
        .await
        .unwrap();

        let pairs = client.list_positions_with_balance().await.unwrap();
        for pair in pairs {
            let state = client.pool_state(pair).await.unwrap();
            assert_eq!(state.lp_decimals, LP_DECIMALS);
            assert!(!state.total_supply.is_zero());
        }
    }
}
