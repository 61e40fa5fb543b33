//! Error types for fintel-agent

use thiserror::Error;

/// Result type alias using fintel-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the reasoning engine adapter
    #[error(transparent)]
    Engine(#[from] fintel_ai::Error),

    /// An error from the storage collaborator
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    /// A generic orchestration error
    #[error("{0}")]
    Other(String),
}
