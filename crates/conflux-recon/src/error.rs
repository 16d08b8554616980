//! Error types for the reconciliation module.

use conflux_core::Bitstring;
use conflux_tree::TreeError;
use thiserror::Error;

use crate::messages::MsgTag;

/// Errors that abort a reconciliation session.
#[derive(Debug, Error)]
pub enum ReconError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Frame exceeds the size limit.
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Peer sent a message that is not valid at this point of the protocol.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(MsgTag),

    /// Peer answered a leaf request with SyncFail.
    #[error("SyncFail received at leaf node {0}")]
    SyncFailAtLeaf(Bitstring),

    /// Peer declared settings incompatible with ours.
    #[error("incompatible remote config: {key} local={local} remote={remote}")]
    ConfigMismatch {
        key: String,
        local: String,
        remote: String,
    },

    /// Tree lookup failed.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection.
    #[error("connection closed")]
    Closed,
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconError>;
