use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid link name {name:?}: {reason}")]
    InvalidLinkName { name: String, reason: String },

    #[error("reserved link class id: {0}")]
    ReservedClassId(u16),
}
