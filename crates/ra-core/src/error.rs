use thiserror::Error;

/// Top-level error type for the ra-core crate and dependents.
#[derive(Debug, Error)]
pub enum RaError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A matchup window was applied while some of its Scripture blocks were
    /// still without a single matched reference block.
    #[error("cannot apply: {} scripture block(s) unmatched at window indices {indices:?}", indices.len())]
    Unmatched { indices: Vec<usize> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, RaError>;
