//! Deferred and resolved pointers to foreign entities.
//!
//! Reference fields store identifiers, not documents. The wrapper types
//! here ([`SingleRef`], [`ListRef`], [`SetRef`], [`MapRef`]) make the
//! deferred fetch explicit: each starts *unresolved* (raw identifiers
//! only) and transitions to *resolved* on first access, a terminal state
//! whose cached value never changes. Eagerly-declared fields resolve
//! during decode instead; lazily-declared fields wait for `get()`.
//!
//! A reference encodes back to a minimal identifier form: a bare
//! identifier while it stays within its declared target collection, or a
//! `{"$ref": collection, "$id": id}` pair when the referenced instance
//! actually lives elsewhere.

mod codec;
mod many;
mod map;
mod single;

pub use many::{ListRef, SetRef};
pub use map::MapRef;
pub use single::SingleRef;

pub(crate) use codec::ReferenceCodec;
pub(crate) use many::{unerase_list, unerase_set, wrap_list, wrap_set};
pub(crate) use map::{unerase_map, wrap_map};
pub(crate) use single::{unerase_single, wrap_single};

use crate::codec::EncodeContext;
use crate::datastore::Datastore;
use crate::error::{CoreResult, MappingError, ReferenceError};
use crate::type_key::TypeKey;
use docmap_document::{Document, Value};
use docmap_store::ID_FIELD;
use std::any::Any;

/// Stored key naming the collection in a cross-collection identifier pair.
pub const REF_COLLECTION_KEY: &str = "$ref";

/// Stored key naming the identifier in a cross-collection identifier pair.
pub const REF_ID_KEY: &str = "$id";

/// Raw stored identifiers, shaped per reference variant.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RawIds {
    /// One identifier (or cross-collection pair).
    One(Value),
    /// An ordered run of identifiers.
    Many(Vec<Value>),
    /// String-keyed identifiers.
    Keyed(Vec<(String, Value)>),
}

/// Everything needed to construct an unresolved reference during decode.
pub struct RefSeed {
    pub(crate) datastore: Datastore,
    pub(crate) target: TypeKey,
    pub(crate) ids: RawIds,
    pub(crate) ignore_missing: bool,
}

/// Resolution state: unresolved, or terminally resolved to a cached value.
pub(crate) enum Resolution<V> {
    Unresolved,
    Resolved(V),
}

/// Object-safe view of a reference value, used by the field codec.
pub trait AnyReference: Send + Sync {
    /// True once the reference has resolved.
    fn is_resolved(&self) -> bool;

    /// Forces resolution now (the eager-decode path).
    fn resolve(&self) -> CoreResult<()>;

    /// Encodes the reference to its minimal stored identifier form.
    fn encode(&self, ctx: &EncodeContext<'_>) -> CoreResult<Value>;
}

/// Splits a raw stored identifier into an optional collection override and
/// the bare identifier value.
pub(crate) fn split_raw(raw: &Value) -> (Option<String>, Value) {
    if let Some(doc) = raw.as_document() {
        if let (Some(collection), Some(id)) = (
            doc.get(REF_COLLECTION_KEY).and_then(Value::as_text),
            doc.get(REF_ID_KEY),
        ) {
            return (Some(collection.to_string()), id.clone());
        }
    }
    (None, raw.clone())
}

/// The bare identifier inside a raw stored form, for re-association.
pub(crate) fn raw_id_value(raw: &Value) -> Value {
    split_raw(raw).1
}

/// Encodes a resolved entity value to its minimal identifier form.
///
/// Bare identifier when the value's mapped class is the field's declared
/// target; a collection+identifier pair when the instance's actual
/// collection differs.
pub(crate) fn encode_entity_ref(
    ctx: &EncodeContext<'_>,
    declared: TypeKey,
    value: &dyn Any,
) -> CoreResult<Value> {
    let mapper = ctx.datastore().mapper();
    let concrete = mapper
        .class_by_type(value.type_id())
        .ok_or_else(|| MappingError::not_mapped(declared.name()))?;
    let id_field = concrete
        .id_field()
        .ok_or_else(|| MappingError::missing_id_field(concrete.name()))?;
    let id = id_field
        .id_value(value)
        .ok_or_else(|| ReferenceError::no_id(concrete.name()))?;

    let declared_class = mapper
        .class_by_type(declared.type_id())
        .ok_or_else(|| MappingError::not_mapped(declared.name()))?;

    if concrete.collection() == declared_class.collection() {
        Ok(Value::Id(id))
    } else {
        let collection = concrete.collection().ok_or_else(|| {
            MappingError::NotPersistable {
                type_name: concrete.name().to_string(),
            }
        })?;
        let mut pair = Document::new();
        pair.insert(REF_COLLECTION_KEY, Value::from(collection));
        pair.insert(REF_ID_KEY, Value::Id(id));
        Ok(Value::Document(pair))
    }
}

/// Fetches a batch of raw identifiers in as few round trips as possible:
/// identifiers are grouped by target collection and each group goes out as
/// one `find_many`. Returns `(stored identifier, decoded instance)` pairs
/// in unspecified order; callers re-associate by identifier equality.
pub(crate) fn fetch_batch(
    datastore: &Datastore,
    target: TypeKey,
    raws: &[Value],
) -> CoreResult<Vec<(Value, Box<dyn Any>)>> {
    let mapper = datastore.mapper();
    let declared = mapper
        .class_by_type(target.type_id())
        .ok_or_else(|| MappingError::not_mapped(target.name()))?;
    let default_collection = declared.collection().ok_or_else(|| {
        MappingError::NotPersistable {
            type_name: declared.name().to_string(),
        }
    })?;

    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for raw in raws {
        let (collection, id) = split_raw(raw);
        let collection = collection.unwrap_or_else(|| default_collection.to_string());
        match groups.iter_mut().find(|(name, _)| *name == collection) {
            Some((_, ids)) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            None => groups.push((collection, vec![id])),
        }
    }

    let mut fetched = Vec::new();
    for (collection, ids) in groups {
        for document in datastore.driver().find_many(&collection, &ids)? {
            let id = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);
            let instance = datastore.decode_dynamic(target, document)?;
            fetched.push((id, instance));
        }
    }
    Ok(fetched)
}
