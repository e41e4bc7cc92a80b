//! Error types for anchorchain

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("contracts root mismatch: block declares {declared}, computed {computed}")]
    BadContractsRoot { declared: String, computed: String },

    #[error("nonces root mismatch: block declares {declared}, computed {computed}")]
    BadNoncesRoot { declared: String, computed: String },

    #[error("proof index {index} out of range for {len} leaves")]
    ProofIndexOutOfRange { index: usize, len: usize },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("block builder already has a build in flight")]
    BuilderBusy,

    #[error("block builder was not started")]
    BuilderNotStarted,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("storage error while {op}: {message}")]
    Storage { op: &'static str, message: String },

    #[error("codec error: {0}")]
    Codec(String),
}

impl ChainError {
    /// Wrap a store backend failure with the operation being attempted.
    pub fn storage(op: &'static str, err: impl std::fmt::Display) -> Self {
        ChainError::Storage { op, message: err.to_string() }
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::Codec(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
