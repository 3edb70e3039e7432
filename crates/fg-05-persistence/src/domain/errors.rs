use thiserror::Error;

/// Errors returned by a knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record cannot be stored as given.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// An entity cannot be merged into itself.
    #[error("cannot merge entity {0} into itself")]
    SelfMerge(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}
