//! Crate error types.

use thiserror::Error;

/// Errors produced by the pretraining controller
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration: malformed schedule anchors, zero accumulation
    /// factor, unreachable cluster coordinator. Always fatal, surfaced before
    /// any epoch runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// A checkpoint slot could not be persisted or restored. Write failures
    /// are reported and training continues; the other slot is still
    /// attempted.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Cross-replica gradient reduction failed. Fatal: no partial-update
    /// recovery is defined.
    #[error("replica synchronization error: {0}")]
    Replica(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, Error>;
