//! Core error types.

use alloy::primitives::Address;
use thiserror::Error;
use watcher_chain::ChainError;

/// Why a position could not be valued this cycle.
#[derive(Debug, Error)]
pub enum ValuationError {
    /// Pool state could not be read from the chain.
    #[error("chain unavailable for {pair}: {source}")]
    ChainUnavailable {
        pair: Address,
        #[source]
        source: ChainError,
    },

    /// The pair has no LP supply, so ownership shares are undefined.
    #[error("pool {0} has zero total supply")]
    EmptyPool(Address),

    /// A token could not be converted into the value currency.
    #[error("no quote for token {token} in pool {pair}: {reason}")]
    QuoteUnavailable {
        pair: Address,
        token: Address,
        reason: String,
    },

    /// Shutdown was requested before the snapshot was complete.
    #[error("valuation of {0} cancelled")]
    Cancelled(Address),
}

impl ValuationError {
    /// Only chain outages are worth retrying within the same cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainUnavailable { .. })
    }
}

pub type ValuationResult<T> = Result<T, ValuationError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_chain_failures_retry() {
        let chain = ValuationError::ChainUnavailable {
            pair: Address::ZERO,
            source: ChainError::Transport("connection reset".into()),
        };
        assert!(chain.is_retryable());
        assert!(!ValuationError::EmptyPool(Address::ZERO).is_retryable());
        assert!(!ValuationError::QuoteUnavailable {
            pair: Address::ZERO,
            token: Address::ZERO,
            reason: "no route".into(),
        }
        .is_retryable());
        assert!(!ValuationError::Cancelled(Address::ZERO).is_retryable());
    }
}
