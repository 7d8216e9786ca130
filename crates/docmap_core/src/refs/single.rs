//! Single-entity references.

use crate::codec::EncodeContext;
use crate::datastore::Datastore;
use crate::error::{CoreResult, MappingError, ReferenceError};
use crate::refs::{encode_entity_ref, split_raw, AnyReference, RawIds, RefSeed, Resolution};
use crate::type_key::TypeKey;
use docmap_document::Value;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A reference to one foreign entity.
///
/// Decoded references start unresolved, holding only the raw stored
/// identifier; the first [`get`](Self::get) issues a point lookup against
/// the target's collection and caches the result for the life of the
/// reference. Wrapping an in-memory value with [`to`](Self::to) starts
/// resolved.
pub struct SingleRef<T: 'static> {
    inner: Arc<SingleInner<T>>,
}

struct SingleInner<T> {
    datastore: Option<Datastore>,
    target: TypeKey,
    ignore_missing: bool,
    raw: Option<Value>,
    state: RwLock<Resolution<Option<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> SingleRef<T> {
    /// Wraps an in-memory value as an already-resolved reference.
    #[must_use]
    pub fn to(value: T) -> Self {
        Self {
            inner: Arc::new(SingleInner {
                datastore: None,
                target: TypeKey::of::<T>(),
                ignore_missing: false,
                raw: None,
                state: RwLock::new(Resolution::Resolved(Some(Arc::new(value)))),
            }),
        }
    }

    pub(crate) fn from_seed(seed: RefSeed) -> CoreResult<Self> {
        let RawIds::One(raw) = seed.ids else {
            return Err(
                MappingError::type_mismatch("single reference", seed.target.name()).into(),
            );
        };
        Ok(Self {
            inner: Arc::new(SingleInner {
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

    /// The raw stored identifier, for references built by decode.
    #[must_use]
    pub fn raw_id(&self) -> Option<&Value> {
        self.inner.raw.as_ref()
    }

    /// Returns the referenced entity, fetching it on first access.
    ///
    /// Returns `None` only when the target is missing and the field was
    /// declared to tolerate missing targets.
    ///
    /// # Errors
    ///
    /// Fails when the target is missing (and not tolerated), or when the
    /// fetch or decode fails.
    pub fn get(&self) -> CoreResult<Option<Arc<T>>> {
        {
            if let Resolution::Resolved(value) = &*self.inner.state.read() {
                return Ok(value.clone());
            }
        }

        let mut state = self.inner.state.write();
        if let Resolution::Resolved(value) = &*state {
            return Ok(value.clone());
        }

        let fetched = self.fetch()?;
        if fetched.is_none() && !self.inner.ignore_missing {
            return Err(ReferenceError::missing_entity(
                self.inner.target.short_name(),
                format!("{:?}", self.inner.raw),
            )
            .into());
        }
        *state = Resolution::Resolved(fetched.clone());
        Ok(fetched)
    }

    fn fetch(&self) -> CoreResult<Option<Arc<T>>> {
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

        let mapper = datastore.mapper();
        let declared = mapper
            .class_by_type(self.inner.target.type_id())
            .ok_or_else(|| MappingError::not_mapped(self.inner.target.name()))?;

        let (collection, id) = split_raw(raw);
        let collection = match collection {
            Some(name) => name,
            None => declared
                .collection()
                .ok_or_else(|| MappingError::NotPersistable {
                    type_name: declared.name().to_string(),
                })?
                .to_string(),
        };

        let Some(document) = datastore.driver().find_one(&collection, &id)? else {
            return Ok(None);
        };
        let instance = datastore.decode_dynamic(self.inner.target, document)?;
        match instance.downcast::<T>() {
            Ok(boxed) => Ok(Some(Arc::from(boxed))),
            Err(_) => Err(MappingError::type_mismatch(
                self.inner.target.name(),
                "reference resolution",
            )
            .into()),
        }
    }
}

impl<T: Send + Sync + 'static> AnyReference for SingleRef<T> {
    fn is_resolved(&self) -> bool {
        SingleRef::is_resolved(self)
    }

    fn resolve(&self) -> CoreResult<()> {
        self.get().map(|_| ())
    }

    fn encode(&self, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        // Identifiers are immutable, so a reference decoded from storage
        // re-encodes its original raw form unchanged, including any
        // cross-collection pair. Only in-memory wrapped values derive a
        // fresh minimal form.
        if let Some(raw) = &self.inner.raw {
            return Ok(raw.clone());
        }
        let state = self.inner.state.read();
        match &*state {
            Resolution::Resolved(Some(value)) => {
                encode_entity_ref(ctx, self.inner.target, &**value as &dyn Any)
            }
            Resolution::Resolved(None) => Ok(Value::Null),
            Resolution::Unresolved => {
                Err(ReferenceError::detached(self.inner.target.short_name()).into())
            }
        }
    }
}

impl<T> Clone for SingleRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for SingleRef<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner.raw, &other.inner.raw) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Arc::ptr_eq(&self.inner, &other.inner),
            _ => false,
        }
    }
}

impl<T> fmt::Debug for SingleRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleRef")
            .field("target", &self.inner.target)
            .field("raw", &self.inner.raw)
            .field(
                "resolved",
                &matches!(&*self.inner.state.read(), Resolution::Resolved(_)),
            )
            .finish()
    }
}

pub(crate) fn wrap_single<E: Send + Sync + 'static>(seed: RefSeed) -> CoreResult<Box<dyn Any>> {
    SingleRef::<E>::from_seed(seed).map(|r| Box::new(r) as Box<dyn Any>)
}

pub(crate) fn unerase_single<E: Send + Sync + 'static>(
    value: &dyn Any,
) -> Option<&dyn AnyReference> {
    value
        .downcast_ref::<SingleRef<E>>()
        .map(|r| r as &dyn AnyReference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_document::EntityId;

    #[test]
    fn wrapped_value_is_already_resolved() {
        let reference = SingleRef::to("payload".to_string());
        assert!(reference.is_resolved());
        assert_eq!(*reference.get().unwrap().unwrap(), "payload");
    }

    #[test]
    fn equality_follows_raw_identifiers() {
        let id = EntityId::new();
        let seed = |raw: Value| RefSeed {
            datastore: crate::datastore::Datastore::new(
                std::sync::Arc::new(docmap_store::MemoryStore::new()),
                std::sync::Arc::new(crate::mapper::Mapper::new(
                    crate::options::MapperOptions::default(),
                )),
            ),
            target: crate::type_key::TypeKey::of::<String>(),
            ids: RawIds::One(raw),
            ignore_missing: false,
        };

        let a = SingleRef::<String>::from_seed(seed(Value::Id(id))).unwrap();
        let b = SingleRef::<String>::from_seed(seed(Value::Id(id))).unwrap();
        let c = SingleRef::<String>::from_seed(seed(Value::Id(EntityId::new()))).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        // Wrapped references compare by handle, not content.
        let w1 = SingleRef::to("x".to_string());
        let w2 = SingleRef::to("x".to_string());
        assert_ne!(w1, w2);
        assert_eq!(w1, w1.clone());
    }
}
