//! Typed errors surfaced by the dataset store and validation layer.
//!
//! These are never retried: they indicate malformed input or a caller bug,
//! not a transient condition.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExedaError {
    /// The input dataset cannot be analyzed (e.g., zero columns).
    #[error("invalid input dataset: {0}")]
    InvalidInput(String),

    /// A structured record (change log entry, metadata value) failed
    /// shape validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced column does not exist in the dataset.
    #[error("unknown column: '{0}'")]
    UnknownColumn(String),
}
