//! Chain interaction layer for the liquidity watcher.
//!
//! This crate provides:
//! - Contract bindings for the UniswapV2 router, factory, pair and ERC20 tokens
//! - A read provider for pool state, quotes and factory enumeration
//! - Transaction signing and sending with a cached nonce
//! - Gas strategy abstraction (fixed or node-priced, capped)
//! - The `LiquidityClient` trait and its UniswapV2 implementation

mod client;
mod contracts;
mod error;
pub mod gas;
mod provider;
mod signer;
pub mod units;

pub use client::{
    ClientConfig, LiquidityClient, PoolState, UniswapV2Client, WithdrawOutcome, LP_DECIMALS,
};
pub use contracts::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, RouterContract, IERC20};
pub use error::{ChainError, ChainResult};
pub use provider::{PairReading, ReadProvider, TokenMeta};
pub use signer::{parse_private_key, LocalNonce, TransactionSender, TransactionSenderBuilder};
