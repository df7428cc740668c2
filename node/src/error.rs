//! Node-level error type: wraps the consensus core's `FractalChainError`
//! plus the ambient failure modes that only exist once a network and a
//! disk are involved (Network, Storage).

use fractalchain_core::error::FractalChainError;
use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Consensus(#[from] FractalChainError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Oversize message, rate limit, incompatible protocol, or an unknown
/// message type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("message exceeds the maximum size of {0} bytes")]
    OversizeMessage(usize),

    #[error("rate limit exceeded for peer {0}")]
    RateLimited(String),

    #[error("peer {0} advertised an incompatible protocol version {1}")]
    IncompatibleProtocol(String, String),

    #[error("peer {0} is not connected")]
    PeerNotConnected(String),

    #[error("connection to {0} failed: {1}")]
    ConnectFailed(String, String),

    #[error("HELLO handshake with {0} timed out")]
    HandshakeTimeout(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
