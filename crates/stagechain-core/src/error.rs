//! Error types for stagechain core.

use thiserror::Error;

/// Errors that can occur while generating or decoding a chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The script submitted for protection was empty or whitespace-only.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Randomness or templating failed while building a chain.
    #[error("generation failure: {0}")]
    GenerationFailure(String),

    /// The chain configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A cipher operation was given an empty key.
    #[error("cipher key must not be empty")]
    EmptyKey,

    /// Radix-64 decoding failed.
    #[error("decoding error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// A generated chain violated one of its structural invariants.
    #[error("broken chain: {0}")]
    BrokenChain(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, ChainError>;
