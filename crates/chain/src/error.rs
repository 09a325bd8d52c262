//! Chain client error types.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// RPC request failed or the node was unreachable.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// Contract call reverted or returned data that did not decode.
    #[error("contract call failed: {0}")]
    Contract(String),

    /// Transaction was mined with a failing status.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// Receipt was not observed within the configured timeout.
    #[error("timed out after {0}s waiting for transaction receipt")]
    Timeout(u64),

    /// Bad key, URL or address in the client configuration.
    #[error("invalid chain configuration: {0}")]
    Config(String),
}

impl ChainError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<alloy::contract::Error> for ChainError {
    fn from(e: alloy::contract::Error) -> Self {
        match e {
            alloy::contract::Error::TransportError(t) => Self::Transport(t.to_string()),
            other => Self::Contract(other.to_string()),
        }
    }
}

impl From<alloy::transports::TransportError> for ChainError {
    fn from(e: alloy::transports::TransportError) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
