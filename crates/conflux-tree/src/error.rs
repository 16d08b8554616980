//! Error types for the tree module.

use conflux_core::{Bitstring, FieldElement};
use thiserror::Error;

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// No node exists for the requested prefix.
    #[error("prefix-tree node not found: {0}")]
    NodeNotFound(Bitstring),

    /// Element is already in the tree.
    #[error("element already present: {0}")]
    DuplicateElement(FieldElement),

    /// Element is not in the tree.
    #[error("element not found: {0}")]
    ElementNotFound(FieldElement),

    /// Tree shape parameters are unusable.
    #[error("invalid tree config: {0}")]
    InvalidConfig(String),

    /// Element belongs to a different field than the tree.
    #[error("element modulus does not match tree: expected Z({expected}), got Z({got})")]
    ModulusMismatch { expected: String, got: String },
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
