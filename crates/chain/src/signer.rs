//! Transaction signer and sender for liquidity withdrawals.
//!
//! - Nonce kept locally and resynced from the chain after a failure
//! - Receipt wait is bounded by the configured transaction timeout
//! - Confirmations are linked to a block explorer when a prefix is configured

use crate::error::{ChainError, ChainResult};
use crate::gas::{FixedGasStrategy, GasStrategy};
use crate::provider::parse_rpc_url;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Account nonce kept in memory between withdrawals.
///
/// Seeded from the chain when the sender is built and re-read from the chain
/// whenever a send fails, so a dropped transaction never leaves a gap.
pub struct LocalNonce {
    value: AtomicU64,
}

impl LocalNonce {
    pub fn new(chain_nonce: u64) -> Self {
        Self {
            value: AtomicU64::new(chain_nonce),
        }
    }

    /// Claim the nonce for the next transaction.
    pub fn claim(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst)
    }

    /// Overwrite with the chain's view; returns the value it replaced.
    pub fn resync(&self, chain_nonce: u64) -> u64 {
        self.value.swap(chain_nonce, Ordering::SeqCst)
    }
}

/// Enough for approve or removeLiquidity on a UniswapV2 pair.
const DEFAULT_GAS_LIMIT: u64 = 350_000;

const DEFAULT_TXN_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for [`TransactionSender`]; chain id and gas strategy are optional.
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: Option<u64>,
    gas_strategy: Option<Box<dyn GasStrategy>>,
    gas_limit: Option<u64>,
    txn_timeout: Duration,
    explorer_prefix: Option<String>,
}

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id: None,
            gas_strategy: None,
            gas_limit: None,
            txn_timeout: DEFAULT_TXN_TIMEOUT,
            explorer_prefix: None,
        }
    }

    /// Use a fixed chain id instead of asking the node.
    pub fn chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// How long to wait for a receipt before giving up.
    pub fn txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }

    /// Block explorer URL prefix; the transaction hash is appended.
    pub fn explorer_prefix(mut self, prefix: Option<String>) -> Self {
        self.explorer_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    /// Derive the account, then read chain id (if unset) and nonce from the node.
    pub async fn build(self, private_key: &str) -> ChainResult<TransactionSender> {
        let signer = parse_private_key(private_key)?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(parse_rpc_url(&self.rpc_url)?);

        let chain_id = match self.chain_id {
            Some(id) => id,
            None => provider.get_chain_id().await?,
        };

        let initial_nonce = provider.get_transaction_count(address).await?;

        // 30 gwei unless configured otherwise
        let gas_strategy = self
            .gas_strategy
            .unwrap_or_else(|| Box::new(FixedGasStrategy::new(30_000_000_000)));

        info!(
            address = %address,
            chain_id = chain_id,
            initial_nonce = initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            txn_timeout_secs = self.txn_timeout.as_secs(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc_url: self.rpc_url,
            wallet,
            address,
            chain_id,
            nonce: LocalNonce::new(initial_nonce),
            gas_limit: self.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            gas_strategy,
            txn_timeout: self.txn_timeout,
            explorer_prefix: self.explorer_prefix,
        })
    }
}

/// Parse a hex private key, with or without the `0x` prefix.
pub fn parse_private_key(private_key: &str) -> ChainResult<PrivateKeySigner> {
    private_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| ChainError::Config(format!("invalid private key: {e}")))
}

/// Signs and submits the watcher's approve and withdrawal transactions.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    nonce: LocalNonce,
    gas_limit: u64,
    gas_strategy: Box<dyn GasStrategy>,
    txn_timeout: Duration,
    explorer_prefix: Option<String>,
}

impl TransactionSender {
    pub fn builder(rpc_url: impl Into<String>) -> TransactionSenderBuilder {
        TransactionSenderBuilder::new(rpc_url)
    }

    /// Explorer link for a transaction, when a prefix is configured.
    pub fn explorer_link(&self, tx_hash: B256) -> Option<String> {
        explorer_link(self.explorer_prefix.as_deref(), tx_hash)
    }

    /// Sign, send and wait for the receipt of one transaction.
    ///
    /// Returns the hash once the transaction is mined with a success status.
    /// A failed status maps to `Reverted`; a receipt not seen within the
    /// configured timeout maps to `Timeout`. The local nonce is resynced from
    /// the chain after any failure.
    pub async fn send_transaction(&self, to: Address, calldata: Bytes) -> ChainResult<B256> {
        let started = Instant::now();
        let nonce = self.nonce.claim();
        let gas_price = self.gas_strategy.gas_price(&self.rpc_url).await?;

        let mut tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_chain_id(self.chain_id);
        self.gas_strategy.apply_gas(&mut tx, gas_price);

        info!(
            to = %to,
            nonce = nonce,
            gas_limit = self.gas_limit,
            gas_price_gwei = gas_price / 1_000_000_000,
            "Sending transaction"
        );

        let result = self.submit_and_wait(tx).await;
        if result.is_err() {
            self.sync_nonce().await;
        }
        let tx_hash = result?;

        info!(
            tx_hash = %tx_hash,
            total_ms = started.elapsed().as_millis(),
            explorer = self.explorer_link(tx_hash).as_deref().unwrap_or("-"),
            "Transaction confirmed"
        );
        Ok(tx_hash)
    }

    async fn submit_and_wait(&self, tx: TransactionRequest) -> ChainResult<B256> {
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(parse_rpc_url(&self.rpc_url)?);

        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();

        info!(
            tx_hash = %tx_hash,
            explorer = self.explorer_link(tx_hash).as_deref().unwrap_or("-"),
            "Transaction submitted, waiting for confirmation"
        );

        let receipt = tokio::time::timeout(self.txn_timeout, pending.get_receipt())
            .await
            .map_err(|_| ChainError::Timeout(self.txn_timeout.as_secs()))?
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if receipt.status() {
            debug!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                "Receipt received"
            );
            Ok(tx_hash)
        } else {
            warn!(tx_hash = %tx_hash, "Transaction reverted");
            Err(ChainError::Reverted(tx_hash.to_string()))
        }
    }

    /// Re-read the account nonce from the chain.
    pub async fn sync_nonce(&self) {
        let url = match parse_rpc_url(&self.rpc_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
                return;
            }
        };
        let provider = ProviderBuilder::new().on_http(url);
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                let stale = self.nonce.resync(chain_nonce);
                debug!(nonce = chain_nonce, stale = stale, "Nonce resynced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }
}

fn explorer_link(prefix: Option<&str>, tx_hash: B256) -> Option<String> {
    prefix.map(|p| format!("{p}{tx_hash}"))
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key, never funded on a real network
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_local_nonce_claims_in_order() {
        let nonce = LocalNonce::new(7);
        assert_eq!(nonce.claim(), 7);
        assert_eq!(nonce.claim(), 8);

        // A failed approve leaves the chain at 8
        assert_eq!(nonce.resync(8), 9);
        assert_eq!(nonce.claim(), 8);
    }

    #[test]
    fn test_parse_private_key() {
        let with_prefix = parse_private_key(TEST_KEY).unwrap();
        let without_prefix = parse_private_key(TEST_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with_prefix.address(), without_prefix.address());
        assert_eq!(
            format!("{:?}", with_prefix.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        assert!(matches!(
            parse_private_key("not-a-key"),
            Err(ChainError::Config(_))
        ));
    }

    #[test]
    fn test_explorer_link() {
        let hash = B256::repeat_byte(0xab);
        let link = explorer_link(Some("https://explorer.harmony.one/tx/"), hash).unwrap();
        assert!(link.starts_with("https://explorer.harmony.one/tx/0xabab"));
        assert!(explorer_link(None, hash).is_none());
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_key_before_network() {
        let err = TransactionSender::builder("http://127.0.0.1:1")
            .chain_id(Some(1666600000))
            .build("garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sender_creation() {
        let sender = TransactionSender::builder("https://api.harmony.one/")
            .explorer_prefix(Some("https://explorer.harmony.one/tx/".to_string()))
            .build(TEST_KEY)
            .await
            .unwrap();

        assert_ne!(sender.address, Address::ZERO);
        assert!(sender.explorer_link(B256::ZERO).is_some());
    }
}
