//! Error taxonomy for the store.

use thiserror::Error;

/// Errors a [`crate::Store`] operation can fail with.
///
/// Mirrors the abstract taxonomy of the core error model: `ClientInput`
/// and `Conflict` are reported verbatim to the caller, `NotFound` is
/// surfaced, `Backend` failures are retried internally with backoff
/// before being surfaced.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("illegal transition for {entity} {id}: {from} -> {to}")]
    Conflict {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
