//! Error types for the store contract.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An inserted document carried no identifier entry.
    #[error("document has no identifier entry in collection {collection}")]
    MissingId {
        /// Collection the insert targeted.
        collection: String,
    },

    /// An insert collided with an existing identifier.
    #[error("duplicate identifier {id} in collection {collection}")]
    DuplicateId {
        /// Collection the insert targeted.
        collection: String,
        /// Display form of the colliding identifier.
        id: String,
    },

    /// The underlying driver failed.
    #[error("store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a missing-identifier error.
    pub fn missing_id(collection: impl Into<String>) -> Self {
        Self::MissingId {
            collection: collection.into(),
        }
    }

    /// Creates a duplicate-identifier error.
    pub fn duplicate_id(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
