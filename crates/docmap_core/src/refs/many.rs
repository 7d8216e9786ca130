//! List and set references.

use crate::codec::EncodeContext;
use crate::datastore::Datastore;
use crate::error::{CoreResult, MappingError, ReferenceError};
use crate::refs::{
    encode_entity_ref, fetch_batch, raw_id_value, AnyReference, RawIds, RefSeed, Resolution,
};
use crate::type_key::TypeKey;
use docmap_document::Value;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared machinery behind [`ListRef`] and [`SetRef`].
struct ManyInner<T> {
    datastore: Option<Datastore>,
    target: TypeKey,
    ignore_missing: bool,
    /// `true` deduplicates by identifier during resolution (set shape).
    dedup: bool,
    raw: Option<Vec<Value>>,
    state: RwLock<Resolution<Arc<Vec<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> ManyInner<T> {
    fn wrapped(values: Vec<T>, dedup: bool) -> Arc<Self> {
        Arc::new(Self {
            datastore: None,
            target: TypeKey::of::<T>(),
            ignore_missing: false,
            dedup,
            raw: None,
            state: RwLock::new(Resolution::Resolved(Arc::new(values))),
        })
    }

    fn from_seed(seed: RefSeed, dedup: bool) -> CoreResult<Arc<Self>> {
        let RawIds::Many(raw) = seed.ids else {
            return Err(
                MappingError::type_mismatch("collection reference", seed.target.name()).into(),
            );
        };
        Ok(Arc::new(Self {
            datastore: Some(seed.datastore),
            target: seed.target,
            ignore_missing: seed.ignore_missing,
            dedup,
            raw: Some(raw),
            state: RwLock::new(Resolution::Unresolved),
        }))
    }

    fn is_resolved(&self) -> bool {
        matches!(&*self.state.read(), Resolution::Resolved(_))
    }

    fn get(&self) -> CoreResult<Arc<Vec<T>>> {
        {
            if let Resolution::Resolved(values) = &*self.state.read() {
                return Ok(Arc::clone(values));
            }
        }

        let mut state = self.state.write();
        if let Resolution::Resolved(values) = &*state {
            return Ok(Arc::clone(values));
        }

        let values = Arc::new(self.fetch()?);
        *state = Resolution::Resolved(Arc::clone(&values));
        Ok(values)
    }

    /// Batched fetch: one round trip per distinct collection, results
    /// re-associated to the stored order by identifier equality.
    fn fetch(&self) -> CoreResult<Vec<T>> {
        let datastore = self
            .datastore
            .as_ref()
            .ok_or_else(|| ReferenceError::detached(self.target.short_name()))?;
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| ReferenceError::detached(self.target.short_name()))?;

        let pool = downcast_pool::<T>(fetch_batch(datastore, self.target, raw)?, self.target)?;

        let mut values = Vec::with_capacity(raw.len());
        let mut seen: Vec<Value> = Vec::new();
        for element in raw {
            let bare = raw_id_value(element);
            if self.dedup && seen.contains(&bare) {
                continue;
            }
            match pool.iter().find(|(id, _)| *id == bare) {
                Some((_, value)) => {
                    values.push(value.clone());
                    if self.dedup {
                        seen.push(bare);
                    }
                }
                None => {
                    if !self.ignore_missing {
                        return Err(ReferenceError::missing_entity(
                            self.target.short_name(),
                            format!("{bare:?}"),
                        )
                        .into());
                    }
                }
            }
        }
        Ok(values)
    }

    fn encode(&self, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        // Storage-decoded references re-encode their original raw forms
        // unchanged; only wrapped in-memory values derive fresh ones.
        if let Some(raw) = &self.raw {
            return Ok(Value::Array(raw.clone()));
        }
        let state = self.state.read();
        match &*state {
            Resolution::Resolved(values) => encode_values(ctx, self.target, values),
            Resolution::Unresolved => {
                Err(ReferenceError::detached(self.target.short_name()).into())
            }
        }
    }
}

fn downcast_pool<T: 'static>(
    fetched: Vec<(Value, Box<dyn Any>)>,
    target: TypeKey,
) -> CoreResult<Vec<(Value, T)>> {
    let mut pool = Vec::with_capacity(fetched.len());
    for (id, instance) in fetched {
        match instance.downcast::<T>() {
            Ok(boxed) => pool.push((id, *boxed)),
            Err(_) => {
                return Err(
                    MappingError::type_mismatch(target.name(), "reference resolution").into(),
                )
            }
        }
    }
    Ok(pool)
}

fn encode_values<T: 'static>(
    ctx: &EncodeContext<'_>,
    target: TypeKey,
    values: &Arc<Vec<T>>,
) -> CoreResult<Value> {
    let mut encoded = Vec::with_capacity(values.len());
    for value in values.iter() {
        encoded.push(encode_entity_ref(ctx, target, value as &dyn Any)?);
    }
    Ok(Value::Array(encoded))
}

macro_rules! many_ref {
    ($name:ident, $dedup:expr, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Starts unresolved when decoded; the first access issues one
        /// batched fetch per distinct target collection and caches the
        /// result for the life of the reference.
        pub struct $name<T: 'static> {
            inner: Arc<ManyInner<T>>,
        }

        impl<T: Clone + Send + Sync + 'static> $name<T> {
            /// Wraps in-memory values as an already-resolved reference.
            #[must_use]
            pub fn to(values: Vec<T>) -> Self {
                Self {
                    inner: ManyInner::wrapped(values, $dedup),
                }
            }

            pub(crate) fn from_seed(seed: RefSeed) -> CoreResult<Self> {
                Ok(Self {
                    inner: ManyInner::from_seed(seed, $dedup)?,
                })
            }

            /// True once the reference has resolved.
            #[must_use]
            pub fn is_resolved(&self) -> bool {
                self.inner.is_resolved()
            }

            /// The raw stored identifiers, for references built by decode.
            #[must_use]
            pub fn raw_ids(&self) -> Option<&[Value]> {
                self.inner.raw.as_deref()
            }

            /// Returns the referenced entities, fetching them on first
            /// access.
            ///
            /// # Errors
            ///
            /// Fails when a target is missing (and not tolerated), or when
            /// the fetch or decode fails.
            pub fn get(&self) -> CoreResult<Arc<Vec<T>>> {
                self.inner.get()
            }
        }

        impl<T: Clone + Send + Sync + 'static> AnyReference for $name<T> {
            fn is_resolved(&self) -> bool {
                self.inner.is_resolved()
            }

            fn resolve(&self) -> CoreResult<()> {
                self.inner.get().map(|_| ())
            }

            fn encode(&self, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
                self.inner.encode(ctx)
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self {
                    inner: Arc::clone(&self.inner),
                }
            }
        }

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                match (&self.inner.raw, &other.inner.raw) {
                    (Some(a), Some(b)) => a == b,
                    (None, None) => Arc::ptr_eq(&self.inner, &other.inner),
                    _ => false,
                }
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("target", &self.inner.target)
                    .field("raw", &self.inner.raw)
                    .field(
                        "resolved",
                        &matches!(&*self.inner.state.read(), Resolution::Resolved(_)),
                    )
                    .finish()
            }
        }
    };
}

many_ref!(ListRef, false, "An ordered list of references to foreign entities.");
many_ref!(
    SetRef,
    true,
    "An unordered set of references, deduplicated by identifier."
);

pub(crate) fn wrap_list<E: Clone + Send + Sync + 'static>(
    seed: RefSeed,
) -> CoreResult<Box<dyn Any>> {
    ListRef::<E>::from_seed(seed).map(|r| Box::new(r) as Box<dyn Any>)
}

pub(crate) fn unerase_list<E: Clone + Send + Sync + 'static>(
    value: &dyn Any,
) -> Option<&dyn AnyReference> {
    value
        .downcast_ref::<ListRef<E>>()
        .map(|r| r as &dyn AnyReference)
}

pub(crate) fn wrap_set<E: Clone + Send + Sync + 'static>(
    seed: RefSeed,
) -> CoreResult<Box<dyn Any>> {
    SetRef::<E>::from_seed(seed).map(|r| Box::new(r) as Box<dyn Any>)
}

pub(crate) fn unerase_set<E: Clone + Send + Sync + 'static>(
    value: &dyn Any,
) -> Option<&dyn AnyReference> {
    value
        .downcast_ref::<SetRef<E>>()
        .map(|r| r as &dyn AnyReference)
}
