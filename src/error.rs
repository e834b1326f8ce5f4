//! Error types for the informer.

use thiserror::Error;

/// Registration-time errors surfaced to callers.
///
/// Runtime failures during streaming (malformed documents, decode failures)
/// are never surfaced; they are logged as invariant violations and absorbed
/// so a long-lived watch worker cannot be killed by one bad record.
#[derive(Debug, Error)]
pub enum InformerError {
    #[error("informer already been closed")]
    Closed,

    #[error("already watched: {0}")]
    AlreadyWatched(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Result type for informer operations.
pub type Result<T> = std::result::Result<T, InformerError>;
