//! # DocMap Document Model
//!
//! In-memory document values for DocMap.
//!
//! This crate defines the structured form entities are mapped to and from:
//! - [`Value`]: a dynamic document value (scalars, arrays, nested documents)
//! - [`Document`]: a string-keyed map that preserves insertion order
//! - [`EntityId`]: a 128-bit entity identifier
//!
//! ## Field Ordering
//!
//! Unlike canonical wire encodings that sort map keys, [`Document`] keeps
//! fields in insertion order. Mapped documents mirror field declaration
//! order, which is a stable-order contract relied on by round-trip tests
//! and human-readable layouts.
//!
//! ## Usage
//!
//! ```
//! use docmap_document::{Document, Value};
//!
//! let mut doc = Document::new();
//! doc.insert("name", Value::from("Alice"));
//! doc.insert("age", Value::from(30i64));
//!
//! assert_eq!(doc.get("name"), Some(&Value::from("Alice")));
//! assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["name", "age"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod id;
mod value;

pub use document::Document;
pub use id::EntityId;
pub use value::Value;
