//! Codec generation and the type-codec registry contract.
//!
//! A [`ValueCodec`] converts between an erased in-memory field value and a
//! stored [`Value`]. Leaf codecs come from a [`TypeCodecRegistry`]
//! collaborator keyed by the field's full generic type signature; entity
//! and reference codecs are generated from metadata. Specialization pairs
//! each field with its codec exactly once, eagerly, right after a type's
//! codec is registered.

mod entity;
mod scalars;

pub use entity::EntityCodec;
pub use scalars::{DefaultCodecRegistry, ListCodec, OptionCodec, ScalarCodec, StringMapCodec};

pub(crate) use scalars::list_of;

use crate::datastore::Datastore;
use crate::error::CoreResult;
use crate::type_key::TypeKey;
use docmap_document::Value;
use std::any::Any;
use std::sync::Arc;

/// Context passed through encode calls.
pub struct EncodeContext<'a> {
    datastore: &'a Datastore,
}

impl<'a> EncodeContext<'a> {
    /// Creates an encode context.
    #[must_use]
    pub fn new(datastore: &'a Datastore) -> Self {
        Self { datastore }
    }

    /// The datastore the operation runs against.
    #[must_use]
    pub fn datastore(&self) -> &Datastore {
        self.datastore
    }
}

/// Context passed through decode calls.
pub struct DecodeContext<'a> {
    datastore: &'a Datastore,
}

impl<'a> DecodeContext<'a> {
    /// Creates a decode context.
    #[must_use]
    pub fn new(datastore: &'a Datastore) -> Self {
        Self { datastore }
    }

    /// The datastore the operation runs against.
    #[must_use]
    pub fn datastore(&self) -> &Datastore {
        self.datastore
    }
}

/// Converts one field value between its in-memory and stored forms.
///
/// Values cross the trait boundary type-erased; a codec knows the concrete
/// type it serves and downcasts internally.
pub trait ValueCodec: Send + Sync {
    /// Encodes an in-memory value to its stored form.
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value>;

    /// Decodes a stored value to its in-memory form.
    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>>;
}

/// The type-codec registry collaborator.
///
/// Looked up once per field during specialization, keyed by the field's
/// full generic type signature. The mapping layer treats this as opaque:
/// if lookup yields nothing and the field is not itself a mapped type,
/// codec generation fails.
pub trait TypeCodecRegistry: Send + Sync {
    /// Returns the codec for a type signature, if one is registered.
    fn lookup(&self, key: TypeKey) -> Option<Arc<dyn ValueCodec>>;
}
