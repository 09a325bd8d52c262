//! Read-only access to UniswapV2 contracts.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use tracing::{debug, info};

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, IERC20};
use crate::error::{ChainError, ChainResult};

pub(crate) fn parse_rpc_url(rpc_url: &str) -> ChainResult<Url> {
    rpc_url
        .parse()
        .map_err(|e| ChainError::Config(format!("invalid rpc url {rpc_url}: {e}")))
}

/// Raw reserves, balance and supply of one pair, as read in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReading {
    pub reserve0: U256,
    pub reserve1: U256,
    pub lp_balance: U256,
    pub total_supply: U256,
}

/// Token metadata needed for normalisation and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMeta {
    pub decimals: u8,
    pub symbol: String,
}

/// Reader for the router, factory, pair and token contracts.
#[derive(Debug, Clone)]
pub struct ReadProvider {
    rpc_url: String,
    router: Address,
    factory: Address,
}

impl ReadProvider {
    /// Create a reader and verify the endpoint answers.
    pub async fn connect(rpc_url: &str, router: Address, factory: Address) -> ChainResult<Self> {
        let reader = Self::new(rpc_url, router, factory);
        let block = reader.block_number().await?;
        info!(
            rpc = rpc_url,
            router = %router,
            factory = %factory,
            block = block,
            "Provider connection verified"
        );
        Ok(reader)
    }

    /// Create a reader without touching the network.
    pub fn new(rpc_url: &str, router: Address, factory: Address) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            router,
            factory,
        }
    }

    fn provider(&self) -> ChainResult<impl Provider> {
        Ok(ProviderBuilder::new().on_http(parse_rpc_url(&self.rpc_url)?))
    }

    pub async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.provider()?.get_block_number().await?)
    }

    /// Resolve the two underlying tokens of a pair.
    pub async fn pair_tokens(&self, pair: Address) -> ChainResult<(Address, Address)> {
        let provider = self.provider()?;
        let contract = IUniswapV2Pair::new(pair, &provider);

        let token0_call = contract.token0();
        let token1_call = contract.token1();
        let (token0, token1) = tokio::join!(token0_call.call(), token1_call.call());

        Ok((token0?._0, token1?._0))
    }

    /// Read decimals and symbol of an ERC20 token.
    pub async fn token_meta(&self, token: Address) -> ChainResult<TokenMeta> {
        let provider = self.provider()?;
        let contract = IERC20::new(token, &provider);

        let decimals_call = contract.decimals();
        let symbol_call = contract.symbol();
        let (decimals, symbol) = tokio::join!(decimals_call.call(), symbol_call.call());

        Ok(TokenMeta {
            decimals: decimals?._0,
            symbol: symbol?._0,
        })
    }

    /// Read reserves, the owner's LP balance and the LP total supply concurrently.
    pub async fn pair_reading(&self, pair: Address, owner: Address) -> ChainResult<PairReading> {
        let provider = self.provider()?;
        let contract = IUniswapV2Pair::new(pair, &provider);

        let reserves_call = contract.getReserves();
        let balance_call = contract.balanceOf(owner);
        let supply_call = contract.totalSupply();
        let (reserves, balance, supply) = tokio::join!(
            reserves_call.call(),
            balance_call.call(),
            supply_call.call()
        );

        let reserves = reserves?;
        let reading = PairReading {
            reserve0: U256::from(reserves.reserve0),
            reserve1: U256::from(reserves.reserve1),
            lp_balance: balance?._0,
            total_supply: supply?._0,
        };

        debug!(
            pair = %pair,
            reserve0 = %reading.reserve0,
            reserve1 = %reading.reserve1,
            lp_balance = %reading.lp_balance,
            total_supply = %reading.total_supply,
            "Pair state read"
        );

        Ok(reading)
    }

    pub async fn lp_balance(&self, pair: Address, owner: Address) -> ChainResult<U256> {
        let provider = self.provider()?;
        let contract = IUniswapV2Pair::new(pair, &provider);
        Ok(contract.balanceOf(owner).call().await?._0)
    }

    /// LP tokens the router may currently move on behalf of `owner`.
    pub async fn router_allowance(&self, pair: Address, owner: Address) -> ChainResult<U256> {
        let provider = self.provider()?;
        let contract = IUniswapV2Pair::new(pair, &provider);
        Ok(contract.allowance(owner, self.router).call().await?._0)
    }

    /// Router quote: output amounts along `path` for `amount_in`.
    pub async fn amounts_out(&self, amount_in: U256, path: Vec<Address>) -> ChainResult<Vec<U256>> {
        let provider = self.provider()?;
        let router = IUniswapV2Router02::new(self.router, &provider);
        Ok(router.getAmountsOut(amount_in, path).call().await?.amounts)
    }

    /// Wrapped native token known to the router.
    pub async fn weth(&self) -> ChainResult<Address> {
        let provider = self.provider()?;
        let router = IUniswapV2Router02::new(self.router, &provider);
        Ok(router.WETH().call().await?._0)
    }

    pub async fn pair_count(&self) -> ChainResult<u64> {
        let provider = self.provider()?;
        let factory = IUniswapV2Factory::new(self.factory, &provider);
        let count = factory.allPairsLength().call().await?._0;
        u64::try_from(count)
            .map_err(|_| ChainError::Contract(format!("pair count out of range: {count}")))
    }

    pub async fn pair_at(&self, index: u64) -> ChainResult<Address> {
        let provider = self.provider()?;
        let factory = IUniswapV2Factory::new(self.factory, &provider);
        Ok(factory.allPairs(U256::from(index)).call().await?._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let reader = ReadProvider::new("not a url", Address::ZERO, Address::ZERO);
        let err = reader.block_number().await.unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_provider_connect() {
        let reader = ReadProvider::connect(
            "https://api.harmony.one/",
            "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"
                .parse()
                .unwrap(),
            "0xc35DADB65012eC5796536bD9864eD8773aBc74C4"
                .parse()
                .unwrap(),
        )
        .await;

        let reader = reader.unwrap();
        assert!(reader.block_number().await.unwrap() > 0);
        assert!(reader.pair_count().await.unwrap() > 0);
    }
}
