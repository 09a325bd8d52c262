//! Position valuation.
//!
//! Turns raw pool state plus router quotes into a value-currency snapshot of
//! the account's share of one pair. Stateless: every call re-reads the chain.
//! A snapshot is produced whole or not at all.

use alloy::primitives::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use watcher_chain::units::to_decimal;
use watcher_chain::LiquidityClient;

use crate::error::{ValuationError, ValuationResult};

/// One valuation of one position, in the value currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub pair: Address,
    /// `"<SYMBOL_A><><SYMBOL_B>"`
    pub label: String,
    pub token_a: Address,
    pub token_b: Address,
    pub symbol_a: String,
    pub symbol_b: String,
    /// Decimal-normalised pool reserves
    pub reserve_a: f64,
    pub reserve_b: f64,
    /// Account's proportional share of each reserve
    pub amount_a: f64,
    pub amount_b: f64,
    pub value_a: f64,
    pub value_b: f64,
    pub total_value: f64,
}

/// `lp_balance / total_supply * reserve` for both reserves.
///
/// Callers must have rejected a zero supply.
pub fn proportional_amounts(
    lp_balance: f64,
    total_supply: f64,
    reserve_a: f64,
    reserve_b: f64,
) -> (f64, f64) {
    let share = lp_balance / total_supply;
    (share * reserve_a, share * reserve_b)
}

/// Value the account's position in `pair` in units of `value_token`.
///
/// `shutdown` is checked before every chain call.
pub async fn value_position(
    client: &dyn LiquidityClient,
    pair: Address,
    value_token: Address,
    shutdown: &CancellationToken,
) -> ValuationResult<PositionSnapshot> {
    let chain_err = |source| ValuationError::ChainUnavailable { pair, source };
    let live = || {
        if shutdown.is_cancelled() {
            Err(ValuationError::Cancelled(pair))
        } else {
            Ok(())
        }
    };

    live()?;
    let state = client.pool_state(pair).await.map_err(chain_err)?;
    if state.total_supply == U256::ZERO {
        return Err(ValuationError::EmptyPool(pair));
    }

    live()?;
    let symbol_a = client.resolve_symbol(state.token_a).await.map_err(chain_err)?;
    live()?;
    let symbol_b = client.resolve_symbol(state.token_b).await.map_err(chain_err)?;

    let reserve_a = to_decimal(state.reserve_a, state.decimals_a);
    let reserve_b = to_decimal(state.reserve_b, state.decimals_b);
    let (amount_a, amount_b) = proportional_amounts(
        to_decimal(state.lp_balance, state.lp_decimals),
        to_decimal(state.total_supply, state.lp_decimals),
        reserve_a,
        reserve_b,
    );

    live()?;
    let value_a = amount_a * unit_price(client, pair, state.token_a, value_token).await?;
    live()?;
    let value_b = amount_b * unit_price(client, pair, state.token_b, value_token).await?;

    let snapshot = PositionSnapshot {
        pair,
        label: format!("{symbol_a}<>{symbol_b}"),
        token_a: state.token_a,
        token_b: state.token_b,
        symbol_a,
        symbol_b,
        reserve_a,
        reserve_b,
        amount_a,
        amount_b,
        value_a,
        value_b,
        total_value: value_a + value_b,
    };

    debug!(
        pair = %pair,
        label = %snapshot.label,
        amount_a = snapshot.amount_a,
        amount_b = snapshot.amount_b,
        total_value = snapshot.total_value,
        "Position valued"
    );
    Ok(snapshot)
}

/// Value-currency price of one unit of `token`; identity for the value currency itself.
async fn unit_price(
    client: &dyn LiquidityClient,
    pair: Address,
    token: Address,
    value_token: Address,
) -> ValuationResult<f64> {
    if token == value_token {
        return Ok(1.0);
    }

    let quote = client
        .quote_unit(token, value_token)
        .await
        .map_err(|e| ValuationError::QuoteUnavailable {
            pair,
            token,
            reason: e.to_string(),
        })?;

    if !quote.is_finite() || quote < 0.0 {
        return Err(ValuationError::QuoteUnavailable {
            pair,
            token,
            reason: format!("unusable quote {quote}"),
        });
    }
    Ok(quote)
}
