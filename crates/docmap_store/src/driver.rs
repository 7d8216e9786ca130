//! Storage driver trait definition.

use crate::error::StoreResult;
use docmap_document::{Document, Value};

/// The document key under which every stored entity's identifier lives.
pub const ID_FIELD: &str = "_id";

/// A document store consumed by the mapping layer.
///
/// Stores are **opaque document sinks**. They look up and write whole
/// documents by identifier; the mapping layer owns all structure
/// interpretation; stores do not understand entity metadata,
/// discriminators, or references.
///
/// # Invariants
///
/// - `find_one`/`find_many` match on the document's [`ID_FIELD`] entry
/// - `insert` rejects documents without an [`ID_FIELD`] entry and
///   documents whose identifier already exists in the collection
/// - `replace` returns the number of documents it overwrote (`0` or `1`);
///   when an expected-version filter is given, the match must also satisfy
///   it, making the replace a conditional compare-and-swap
/// - Implementations must be `Send + Sync`; calls may block the caller
///   until the driver responds (there is no cancellation contract at this
///   layer)
///
/// # Implementors
///
/// - [`super::MemoryStore`]: for tests and ephemeral data
pub trait DocumentStore: Send + Sync {
    /// Finds one document by identifier.
    ///
    /// Returns `None` if no document in `collection` has the identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    fn find_one(&self, collection: &str, id: &Value) -> StoreResult<Option<Document>>;

    /// Finds all documents whose identifier is in `ids`, in one round trip.
    ///
    /// Missing identifiers are silently absent from the result; the result
    /// order is unspecified and callers must re-associate documents to
    /// identifiers themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    fn find_many(&self, collection: &str, ids: &[Value]) -> StoreResult<Vec<Document>>;

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no identifier entry, the
    /// identifier already exists, or the driver fails.
    fn insert(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Replaces the document with the given identifier.
    ///
    /// When `expected_version` is `Some((field, value))`, the existing
    /// document must also carry `field == value` for the replace to match.
    /// Returns the number of documents replaced. `0` means no match, which
    /// versioned callers interpret as a concurrent modification.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    fn replace(
        &self,
        collection: &str,
        id: &Value,
        expected_version: Option<(&str, i64)>,
        document: Document,
    ) -> StoreResult<u64>;
}
