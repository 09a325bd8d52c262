//! Contract bindings for UniswapV2-style AMMs.
//!
//! This module provides the router, factory, pair and ERC20 interfaces the
//! watcher reads from, plus a router wrapper that encodes and submits the
//! liquidity withdrawal transaction.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ChainError, ChainResult};
use crate::signer::TransactionSender;

sol! {
    /// UniswapV2 router (subset used for quoting and withdrawals)
    #[sol(rpc)]
    interface IUniswapV2Router02 {
        function WETH() external pure returns (address);

        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);

        function removeLiquidity(
            address tokenA,
            address tokenB,
            uint256 liquidity,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB);
    }

    /// UniswapV2 factory (pair enumeration)
    #[sol(rpc)]
    interface IUniswapV2Factory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256 index) external view returns (address);
    }

    /// UniswapV2 pair; the pair contract is also the LP token
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }

    /// ERC20 metadata
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

/// Seconds a submitted withdrawal stays valid on the router.
const WITHDRAW_DEADLINE: Duration = Duration::from_secs(60);

/// Router wrapper with transaction sending capability.
pub struct RouterContract {
    /// Router address
    pub address: Address,
    /// Transaction sender (absent in read-only mode)
    sender: Option<Arc<TransactionSender>>,
}

impl RouterContract {
    /// Create a read-only router wrapper.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sender: None,
        }
    }

    /// Create a router wrapper that can submit transactions.
    pub fn with_sender(address: Address, sender: Arc<TransactionSender>) -> Self {
        Self {
            address,
            sender: Some(sender),
        }
    }

    /// Encode `removeLiquidity` for the whole `liquidity` amount.
    ///
    /// Minimum amounts are 1 wei on both sides: the withdrawal is an exit,
    /// not a trade, so it must not fail on price movement.
    pub fn encode_remove_liquidity(
        &self,
        token_a: Address,
        token_b: Address,
        liquidity: U256,
        to: Address,
        deadline: u64,
    ) -> Bytes {
        let call = IUniswapV2Router02::removeLiquidityCall {
            tokenA: token_a,
            tokenB: token_b,
            liquidity,
            amountAMin: U256::from(1u64),
            amountBMin: U256::from(1u64),
            to,
            deadline: U256::from(deadline),
        };
        Bytes::from(call.abi_encode())
    }

    /// Encode an unlimited LP-token approval for the router.
    pub fn encode_approve(&self) -> Bytes {
        let call = IUniswapV2Pair::approveCall {
            spender: self.address,
            value: U256::MAX,
        };
        Bytes::from(call.abi_encode())
    }

    /// Approve the router to move the pair's LP tokens.
    pub async fn approve_pair(&self, pair: Address) -> ChainResult<B256> {
        let sender = self.require_sender()?;
        tracing::info!(pair = %pair, router = %self.address, "Approving router for LP token");
        sender.send_transaction(pair, self.encode_approve()).await
    }

    /// Withdraw `liquidity` LP tokens from the pair back to the sender.
    pub async fn remove_liquidity(
        &self,
        token_a: Address,
        token_b: Address,
        liquidity: U256,
    ) -> ChainResult<B256> {
        let sender = self.require_sender()?;
        let deadline = unix_now() + WITHDRAW_DEADLINE.as_secs();
        let calldata =
            self.encode_remove_liquidity(token_a, token_b, liquidity, sender.address, deadline);

        tracing::info!(
            router = %self.address,
            token_a = %token_a,
            token_b = %token_b,
            liquidity = %liquidity,
            calldata_len = calldata.len(),
            "Sending removeLiquidity"
        );

        sender.send_transaction(self.address, calldata).await
    }

    fn require_sender(&self) -> ChainResult<&Arc<TransactionSender>> {
        self.sender
            .as_ref()
            .ok_or_else(|| ChainError::Config("signer not configured".to_string()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_liquidity_encoding() {
        let router = RouterContract::new(Address::repeat_byte(0x24));
        let calldata = router.encode_remove_liquidity(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            U256::from(10u64).pow(U256::from(18u64)),
            Address::repeat_byte(3),
            1_700_000_000,
        );

        assert_eq!(
            &calldata[..4],
            IUniswapV2Router02::removeLiquidityCall::SELECTOR.as_slice()
        );
        let decoded = IUniswapV2Router02::removeLiquidityCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.tokenA, Address::repeat_byte(1));
        assert_eq!(decoded.amountAMin, U256::from(1u64));
        assert_eq!(decoded.deadline, U256::from(1_700_000_000u64));
    }

    #[test]
    fn test_approve_targets_router() {
        let router = RouterContract::new(Address::repeat_byte(0x24));
        let calldata = router.encode_approve();
        let decoded = IUniswapV2Pair::approveCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.spender, Address::repeat_byte(0x24));
        assert_eq!(decoded.value, U256::MAX);
    }

    #[tokio::test]
    async fn test_read_only_router_refuses_to_send() {
        let router = RouterContract::new(Address::repeat_byte(0x24));
        let err = router
            .remove_liquidity(Address::ZERO, Address::ZERO, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }
}
