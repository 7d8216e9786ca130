//! String-keyed map references.

use crate::codec::EncodeContext;
use crate::datastore::Datastore;
use crate::error::{CoreResult, MappingError, ReferenceError};
use crate::refs::{
    encode_entity_ref, fetch_batch, raw_id_value, AnyReference, RawIds, RefSeed, Resolution,
};
use crate::type_key::TypeKey;
use docmap_document::{Document, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A string-keyed map of references to foreign entities.
///
/// Keys are application keys and convert independently of the values;
/// values are identifiers subject to the same resolution rules as single
/// references. The batched fetch's result order is unspecified; entities
/// are re-associated to their keys by identifier equality, never by fetch
/// order.
pub struct MapRef<T: 'static> {
    inner: Arc<MapInner<T>>,
}

struct MapInner<T> {
    datastore: Option<Datastore>,
    target: TypeKey,
    ignore_missing: bool,
    raw: Option<Vec<(String, Value)>>,
    state: RwLock<Resolution<Arc<HashMap<String, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> MapRef<T> {
    /// Wraps in-memory values as an already-resolved reference.
    #[must_use]
    pub fn to(values: HashMap<String, T>) -> Self {
        Self {
            inner: Arc::new(MapInner {
                datastore: None,
                target: TypeKey::of::<T>(),
                ignore_missing: false,
                raw: None,
                state: RwLock::new(Resolution::Resolved(Arc::new(values))),
            }),
        }
    }

    pub(crate) fn from_seed(seed: RefSeed) -> CoreResult<Self> {
        let RawIds::Keyed(raw) = seed.ids else {
            return Err(MappingError::type_mismatch("map reference", seed.target.name()).into());
        };
        Ok(Self {
            inner: Arc::new(MapInner {
                datastore: Some(seed.datastore),
                target: seed.target,
                ignore_missing: seed.ignore_missing,
                raw: Some(raw),
                state: RwLock::new(Resolution::Unresolved),
            }),
        })
    }

    /// True once the reference has resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.inner.state.read(), Resolution::Resolved(_))
    }

    /// The raw stored key/identifier pairs, for references built by decode.
    #[must_use]
    pub fn raw_ids(&self) -> Option<&[(String, Value)]> {
        self.inner.raw.as_deref()
    }

    /// Returns the referenced entities keyed by their map keys, fetching
    /// them on first access.
    ///
    /// # Errors
    ///
    /// Fails when a target is missing (and not tolerated), or when the
    /// fetch or decode fails.
    pub fn get(&self) -> CoreResult<Arc<HashMap<String, T>>> {
        {
            if let Resolution::Resolved(values) = &*self.inner.state.read() {
                return Ok(Arc::clone(values));
            }
        }

        let mut state = self.inner.state.write();
        if let Resolution::Resolved(values) = &*state {
            return Ok(Arc::clone(values));
        }

        let values = Arc::new(self.fetch()?);
        *state = Resolution::Resolved(Arc::clone(&values));
        Ok(values)
    }

    fn fetch(&self) -> CoreResult<HashMap<String, T>> {
        let datastore = self
            .inner
            .datastore
            .as_ref()
            .ok_or_else(|| ReferenceError::detached(self.inner.target.short_name()))?;
        let raw = self
            .inner
            .raw
            .as_ref()
            .ok_or_else(|| ReferenceError::detached(self.inner.target.short_name()))?;

        let ids: Vec<Value> = raw.iter().map(|(_, v)| v.clone()).collect();
        let fetched = fetch_batch(datastore, self.inner.target, &ids)?;
        let mut pool: Vec<(Value, T)> = Vec::with_capacity(fetched.len());
        for (id, instance) in fetched {
            match instance.downcast::<T>() {
                Ok(boxed) => pool.push((id, *boxed)),
                Err(_) => {
                    return Err(MappingError::type_mismatch(
                        self.inner.target.name(),
                        "reference resolution",
                    )
                    .into())
                }
            }
        }

        let mut values = HashMap::with_capacity(raw.len());
        for (key, element) in raw {
            let bare = raw_id_value(element);
            match pool.iter().find(|(id, _)| *id == bare) {
                Some((_, value)) => {
                    values.insert(key.clone(), value.clone());
                }
                None => {
                    if !self.inner.ignore_missing {
                        return Err(ReferenceError::missing_entity(
                            self.inner.target.short_name(),
                            format!("{bare:?}"),
                        )
                        .into());
                    }
                }
            }
        }
        Ok(values)
    }
}

impl<T: Clone + Send + Sync + 'static> AnyReference for MapRef<T> {
    fn is_resolved(&self) -> bool {
        MapRef::is_resolved(self)
    }

    fn resolve(&self) -> CoreResult<()> {
        self.get().map(|_| ())
    }

    fn encode(&self, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        // Storage-decoded references re-encode their original raw forms
        // unchanged; only wrapped in-memory values derive fresh ones.
        if let Some(raw) = &self.inner.raw {
            let mut doc = Document::new();
            for (key, value) in raw {
                doc.insert(key.clone(), value.clone());
            }
            return Ok(Value::Document(doc));
        }
        let state = self.inner.state.read();
        match &*state {
            Resolution::Resolved(values) => {
                let mut keys: Vec<&String> = values.keys().collect();
                keys.sort();
                let mut doc = Document::new();
                for key in keys {
                    let value = &values[key];
                    doc.insert(
                        key.clone(),
                        encode_entity_ref(ctx, self.inner.target, value as &dyn Any)?,
                    );
                }
                Ok(Value::Document(doc))
            }
            Resolution::Unresolved => {
                Err(ReferenceError::detached(self.inner.target.short_name()).into())
            }
        }
    }
}

impl<T> Clone for MapRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for MapRef<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner.raw, &other.inner.raw) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Arc::ptr_eq(&self.inner, &other.inner),
            _ => false,
        }
    }
}

impl<T> fmt::Debug for MapRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRef")
            .field("target", &self.inner.target)
            .field("raw", &self.inner.raw)
            .field(
                "resolved",
                &matches!(&*self.inner.state.read(), Resolution::Resolved(_)),
            )
            .finish()
    }
}

pub(crate) fn wrap_map<E: Clone + Send + Sync + 'static>(
    seed: RefSeed,
) -> CoreResult<Box<dyn Any>> {
    MapRef::<E>::from_seed(seed).map(|r| Box::new(r) as Box<dyn Any>)
}

pub(crate) fn unerase_map<E: Clone + Send + Sync + 'static>(
    value: &dyn Any,
) -> Option<&dyn AnyReference> {
    value
        .downcast_ref::<MapRef<E>>()
        .map(|r| r as &dyn AnyReference)
}
