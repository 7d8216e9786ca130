//! # DocMap Core
//!
//! Object-document mapping for DocMap.
//!
//! This crate provides:
//! - Entity metadata discovery ([`EntitySpec`] to [`EntityModel`] /
//!   [`FieldModel`] to [`MappedClass`]) with a structural validator chain
//! - The [`Mapper`] registry: a process-wide, explicitly-constructed cache
//!   from runtime type to metadata, with a subtype graph tolerant of
//!   out-of-order registration
//! - Codec generation: per-entity encode/decode routines specialized per
//!   field against a pluggable type-codec registry
//! - The reference subsystem: lazy or eager single/list/set/map pointers
//!   to foreign entities
//! - [`PathTarget`]: dotted field-path translation for query builders
//! - The [`Datastore`] facade: saves with identifier generation and
//!   optimistic-concurrency version bookkeeping
//!
//! ## Example
//!
//! ```rust,ignore
//! use docmap_core::{Datastore, EntitySpec, FieldSpec, Mappable, Mapper, MapperOptions};
//! use docmap_document::EntityId;
//! use docmap_store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Person {
//!     id: Option<EntityId>,
//!     name: String,
//! }
//!
//! impl Mappable for Person {
//!     fn entity_spec() -> EntitySpec {
//!         EntitySpec::entity::<Person>("Person")
//!             .field(FieldSpec::id("id", |p: &Person| p.id, |p, id| p.id = Some(id)))
//!             .field(FieldSpec::scalar("name", |p: &Person| &p.name, |p, v| p.name = v))
//!     }
//! }
//!
//! let mapper = Arc::new(Mapper::new(MapperOptions::default()));
//! let datastore = Datastore::new(Arc::new(MemoryStore::new()), mapper);
//!
//! let mut person = Person { id: None, name: "Alice".into() };
//! let id = datastore.save(&mut person)?;
//! assert_eq!(person.id, Some(id));
//! # Ok::<(), docmap_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod datastore;
mod entity_model;
mod error;
mod field_model;
mod mapped_class;
mod mapper;
mod naming;
mod options;
mod path;
pub mod refs;
mod spec;
mod type_key;
pub mod validation;

pub use datastore::Datastore;
pub use entity_model::EntityModel;
pub use error::{CoreError, CoreResult, MappingError, ReferenceError, ValidationFailure};
pub use field_model::FieldModel;
pub use mapped_class::MappedClass;
pub use mapper::Mapper;
pub use naming::NamingStrategy;
pub use options::MapperOptions;
pub use path::PathTarget;
pub use refs::{ListRef, MapRef, SetRef, SingleRef};
pub use spec::{
    ArgBag, CreatorSpec, EntityKind, EntitySpec, FieldSpec, LifecycleEvent, Mappable, RefShape,
    SpecLink,
};
pub use type_key::TypeKey;
