//! # DocMap Store
//!
//! Storage driver contract for DocMap.
//!
//! The mapping layer never talks to a database directly; it consumes the
//! narrow [`DocumentStore`] trait defined here. This crate also provides
//! [`MemoryStore`], a thread-safe in-memory implementation suitable for
//! tests and ephemeral use.
//!
//! ## Usage
//!
//! ```
//! use docmap_document::{Document, EntityId, Value};
//! use docmap_store::{DocumentStore, MemoryStore, ID_FIELD};
//!
//! let store = MemoryStore::new();
//! let id = EntityId::new();
//!
//! let mut doc = Document::new();
//! doc.insert(ID_FIELD, Value::Id(id));
//! doc.insert("name", Value::from("Alice"));
//! store.insert("users", doc).unwrap();
//!
//! let found = store.find_one("users", &Value::Id(id)).unwrap();
//! assert!(found.is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod memory;

pub use driver::{DocumentStore, ID_FIELD};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
