//! Error types for Conflux Core.

use thiserror::Error;

/// Errors raised when decoding or parsing core values.
///
/// Arithmetic across different fields is not represented here: it is a
/// contract violation and panics.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid bitstring: {0}")]
    InvalidBitstring(String),

    #[error("invalid field element: {0}")]
    InvalidFieldElement(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
