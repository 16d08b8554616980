//! Error types for the Peer.

use conflux_recon::ReconError;
use conflux_tree::TreeError;
use thiserror::Error;

/// Errors that can occur during Peer operations.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Reconciliation error.
    #[error("reconciliation error: {0}")]
    Recon(#[from] ReconError),

    /// Prefix tree error.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// The peer has not been started yet.
    #[error("peer not running")]
    NotRunning,

    /// The peer has been stopped and cannot be used or restarted.
    #[error("peer stopped")]
    Stopped,

    /// `start` called on a running peer.
    #[error("peer already started")]
    AlreadyStarted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command actor exited before replying.
    #[error("command actor is gone")]
    ActorGone,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for Peer operations.
pub type Result<T> = std::result::Result<T, PeerError>;
