//! Scripted in-memory chain client for unit tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use watcher_chain::units::pow10;
use watcher_chain::{
    ChainError, ChainResult, LiquidityClient, PoolState, WithdrawOutcome, LP_DECIMALS,
};

/// Second token of pools built by [`valued_pool`]; quoted at 1.0 and always empty.
pub const SIDE_TOKEN: Address = Address::repeat_byte(0x5d);

/// Raw amount for a decimal value (exact to 6 places).
pub fn raw(value: f64, decimals: u8) -> U256 {
    if decimals >= 6 {
        U256::from((value * 1e6).round() as u128) * pow10(decimals - 6)
    } else {
        U256::from((value * 10f64.powi(decimals as i32)).round() as u128)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn pool(
    token_a: Address,
    decimals_a: u8,
    reserve_a: f64,
    token_b: Address,
    decimals_b: u8,
    reserve_b: f64,
    lp_balance: f64,
    total_supply: f64,
) -> PoolState {
    PoolState {
        token_a,
        token_b,
        reserve_a: raw(reserve_a, decimals_a),
        reserve_b: raw(reserve_b, decimals_b),
        decimals_a,
        decimals_b,
        lp_balance: raw(lp_balance, LP_DECIMALS),
        total_supply: raw(total_supply, LP_DECIMALS),
        lp_decimals: LP_DECIMALS,
    }
}

/// A wholly-owned pool whose position is worth exactly `value` of `value_token`.
pub fn valued_pool(value_token: Address, value: f64) -> PoolState {
    pool(value_token, 18, value, SIDE_TOKEN, 18, 0.0, 1.0, 1.0)
}

/// Client calls that can trip a shutdown token while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCall {
    PoolState,
    Quote,
    Withdraw,
}

/// Chain client double with per-pair scripted pool states.
///
/// Each pair's script is consumed front to back; the last step repeats.
pub struct ScriptedClient {
    account: Address,
    symbols: HashMap<Address, String>,
    quotes: HashMap<(Address, Address), f64>,
    pools: Mutex<HashMap<Address, VecDeque<ChainResult<PoolState>>>>,
    withdraw_results: Mutex<HashMap<Address, ChainResult<WithdrawOutcome>>>,
    listed: Vec<Address>,
    withdraw_calls: Mutex<Vec<Address>>,
    pool_calls: AtomicU32,
    quote_calls: AtomicU32,
    list_calls: AtomicU32,
    cancel_hook: Mutex<Option<(ChainCall, CancellationToken)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            account: Address::repeat_byte(0xac),
            symbols: HashMap::new(),
            quotes: HashMap::new(),
            pools: Mutex::new(HashMap::new()),
            withdraw_results: Mutex::new(HashMap::new()),
            listed: Vec::new(),
            withdraw_calls: Mutex::new(Vec::new()),
            pool_calls: AtomicU32::new(0),
            quote_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            cancel_hook: Mutex::new(None),
        }
    }

    pub fn with_symbol(mut self, token: Address, symbol: &str) -> Self {
        self.symbols.insert(token, symbol.to_string());
        self
    }

    pub fn with_quote(mut self, token: Address, value_token: Address, quote: f64) -> Self {
        self.quotes.insert((token, value_token), quote);
        self
    }

    pub fn with_pool(self, pair: Address, script: Vec<ChainResult<PoolState>>) -> Self {
        self.pools.lock().insert(pair, script.into());
        self
    }

    /// Script a position whose value follows `values`, one per poll.
    pub fn with_values(self, pair: Address, value_token: Address, values: &[f64]) -> Self {
        let script = values
            .iter()
            .map(|v| Ok(valued_pool(value_token, *v)))
            .collect();
        self.with_quote(SIDE_TOKEN, value_token, 1.0)
            .with_pool(pair, script)
    }

    pub fn with_withdraw_result(
        self,
        pair: Address,
        result: ChainResult<WithdrawOutcome>,
    ) -> Self {
        self.withdraw_results.lock().insert(pair, result);
        self
    }

    pub fn with_listed(mut self, pairs: Vec<Address>) -> Self {
        self.listed = pairs;
        self
    }

    /// Cancel `shutdown` from inside the next `call`; the call itself still completes.
    pub fn cancel_during(&self, call: ChainCall, shutdown: CancellationToken) {
        *self.cancel_hook.lock() = Some((call, shutdown));
    }

    fn trip(&self, call: ChainCall) {
        let mut hook = self.cancel_hook.lock();
        if matches!(hook.as_ref(), Some((armed, _)) if *armed == call) {
            if let Some((_, shutdown)) = hook.take() {
                shutdown.cancel();
            }
        }
    }

    pub fn withdrawals(&self) -> Vec<Address> {
        self.withdraw_calls.lock().clone()
    }

    pub fn pool_calls(&self) -> u32 {
        self.pool_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> u32 {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiquidityClient for ScriptedClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn resolve_symbol(&self, token: Address) -> ChainResult<String> {
        Ok(self
            .symbols
            .get(&token)
            .cloned()
            .unwrap_or_else(|| "TKN".to_string()))
    }

    async fn pool_state(&self, pair: Address) -> ChainResult<PoolState> {
        self.pool_calls.fetch_add(1, Ordering::SeqCst);
        self.trip(ChainCall::PoolState);
        let mut pools = self.pools.lock();
        let script = pools
            .get_mut(&pair)
            .ok_or_else(|| ChainError::Contract(format!("unknown pair {pair}")))?;
        let step = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        step.unwrap_or_else(|| Err(ChainError::Contract("empty script".into())))
    }

    async fn quote_unit(&self, token: Address, value_token: Address) -> ChainResult<f64> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.trip(ChainCall::Quote);
        self.quotes
            .get(&(token, value_token))
            .copied()
            .ok_or_else(|| ChainError::Contract("INSUFFICIENT_LIQUIDITY".into()))
    }

    async fn withdraw_all(&self, pair: Address) -> ChainResult<WithdrawOutcome> {
        self.withdraw_calls.lock().push(pair);
        self.trip(ChainCall::Withdraw);
        self.withdraw_results
            .lock()
            .get(&pair)
            .cloned()
            .unwrap_or_else(|| Ok(WithdrawOutcome::confirmed(B256::repeat_byte(0x11))))
    }

    async fn list_positions_with_balance(&self) -> ChainResult<Vec<Address>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.listed.clone())
    }
}
