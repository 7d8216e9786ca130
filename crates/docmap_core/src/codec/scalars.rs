//! Leaf codecs and the standard type-codec registry.

use crate::codec::{DecodeContext, EncodeContext, TypeCodecRegistry, ValueCodec};
use crate::error::{CoreResult, MappingError};
use crate::type_key::TypeKey;
use docmap_document::{Document, EntityId, Value};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// A codec for one scalar type, built from a pair of conversion functions.
pub struct ScalarCodec<F: 'static> {
    type_name: &'static str,
    to_value: fn(&F) -> Value,
    from_value: fn(&Value) -> Option<F>,
    _marker: PhantomData<fn() -> F>,
}

impl<F: 'static> ScalarCodec<F> {
    /// Creates a scalar codec from conversion functions.
    #[must_use]
    pub fn new(to_value: fn(&F) -> Value, from_value: fn(&Value) -> Option<F>) -> Self {
        Self {
            type_name: std::any::type_name::<F>(),
            to_value,
            from_value,
            _marker: PhantomData,
        }
    }
}

impl<F: 'static> ValueCodec for ScalarCodec<F> {
    fn encode(&self, value: &dyn Any, _ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let typed = value
            .downcast_ref::<F>()
            .ok_or_else(|| MappingError::type_mismatch(self.type_name, "scalar encode"))?;
        Ok((self.to_value)(typed))
    }

    fn decode(&self, value: &Value, _ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        let parsed = (self.from_value)(value).ok_or_else(|| {
            MappingError::invalid_value(self.type_name, "convertible value", value.type_name())
        })?;
        Ok(Box::new(parsed))
    }
}

/// A codec for `Vec<F>`, delegating elements to an inner codec.
pub struct ListCodec<F: 'static> {
    inner: Arc<dyn ValueCodec>,
    _marker: PhantomData<fn() -> F>,
}

impl<F: 'static> ListCodec<F> {
    /// Creates a list codec around an element codec.
    #[must_use]
    pub fn new(inner: Arc<dyn ValueCodec>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<F: 'static> ValueCodec for ListCodec<F> {
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let items = value
            .downcast_ref::<Vec<F>>()
            .ok_or_else(|| MappingError::type_mismatch(std::any::type_name::<Vec<F>>(), "list encode"))?;
        let mut encoded = Vec::with_capacity(items.len());
        for item in items {
            encoded.push(self.inner.encode(item as &dyn Any, ctx)?);
        }
        Ok(Value::Array(encoded))
    }

    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        let items = value.as_array().ok_or_else(|| {
            MappingError::invalid_value(std::any::type_name::<Vec<F>>(), "array", value.type_name())
        })?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in items {
            let element = self.inner.decode(item, ctx)?;
            match element.downcast::<F>() {
                Ok(boxed) => decoded.push(*boxed),
                Err(_) => {
                    return Err(MappingError::type_mismatch(
                        std::any::type_name::<F>(),
                        "list decode",
                    )
                    .into())
                }
            }
        }
        Ok(Box::new(decoded))
    }
}

/// Wraps an element codec in a [`ListCodec`] for `Vec<F>` fields.
pub(crate) fn list_of<F: 'static>(inner: Arc<dyn ValueCodec>) -> Arc<dyn ValueCodec> {
    Arc::new(ListCodec::<F>::new(inner))
}

/// A codec for `Option<F>`, mapping `None` to null.
pub struct OptionCodec<F: 'static> {
    inner: Arc<dyn ValueCodec>,
    _marker: PhantomData<fn() -> F>,
}

impl<F: 'static> OptionCodec<F> {
    /// Creates an option codec around an element codec.
    #[must_use]
    pub fn new(inner: Arc<dyn ValueCodec>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<F: 'static> ValueCodec for OptionCodec<F> {
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let typed = value.downcast_ref::<Option<F>>().ok_or_else(|| {
            MappingError::type_mismatch(std::any::type_name::<Option<F>>(), "option encode")
        })?;
        match typed {
            Some(inner) => self.inner.encode(inner as &dyn Any, ctx),
            None => Ok(Value::Null),
        }
    }

    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        if value.is_null() {
            return Ok(Box::new(None::<F>));
        }
        let element = self.inner.decode(value, ctx)?;
        match element.downcast::<F>() {
            Ok(boxed) => Ok(Box::new(Some(*boxed))),
            Err(_) => Err(MappingError::type_mismatch(
                std::any::type_name::<F>(),
                "option decode",
            )
            .into()),
        }
    }
}

/// A codec for `HashMap<String, F>`.
///
/// Keys are written in sorted order so encoded documents are
/// deterministic.
pub struct StringMapCodec<F: 'static> {
    inner: Arc<dyn ValueCodec>,
    _marker: PhantomData<fn() -> F>,
}

impl<F: 'static> StringMapCodec<F> {
    /// Creates a string-map codec around a value codec.
    #[must_use]
    pub fn new(inner: Arc<dyn ValueCodec>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<F: 'static> ValueCodec for StringMapCodec<F> {
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let typed = value.downcast_ref::<HashMap<String, F>>().ok_or_else(|| {
            MappingError::type_mismatch(std::any::type_name::<HashMap<String, F>>(), "map encode")
        })?;
        let mut keys: Vec<&String> = typed.keys().collect();
        keys.sort();
        let mut doc = Document::new();
        for key in keys {
            let item = &typed[key];
            doc.insert(key.clone(), self.inner.encode(item as &dyn Any, ctx)?);
        }
        Ok(Value::Document(doc))
    }

    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        let doc = value.as_document().ok_or_else(|| {
            MappingError::invalid_value(
                std::any::type_name::<HashMap<String, F>>(),
                "document",
                value.type_name(),
            )
        })?;
        let mut decoded: HashMap<String, F> = HashMap::with_capacity(doc.len());
        for (key, item) in doc.iter() {
            let element = self.inner.decode(item, ctx)?;
            match element.downcast::<F>() {
                Ok(boxed) => {
                    decoded.insert(key.to_string(), *boxed);
                }
                Err(_) => {
                    return Err(MappingError::type_mismatch(
                        std::any::type_name::<F>(),
                        "map decode",
                    )
                    .into())
                }
            }
        }
        Ok(Box::new(decoded))
    }
}

/// The standard type-codec registry.
///
/// Pre-populated with the common scalar and container signatures; callers
/// register additional signatures (their own scalars, deeper containers)
/// before mapping types that use them.
pub struct DefaultCodecRegistry {
    codecs: RwLock<HashMap<TypeId, Arc<dyn ValueCodec>>>,
}

impl Default for DefaultCodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCodecRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry pre-populated with the standard codecs.
    #[must_use]
    pub fn standard() -> Self {
        let registry = Self::new();

        let string: Arc<dyn ValueCodec> = Arc::new(ScalarCodec::<String>::new(
            |s| Value::Text(s.clone()),
            |v| v.as_text().map(str::to_string),
        ));
        registry.insert::<String>(Arc::clone(&string));
        registry.insert::<Vec<String>>(list_of::<String>(Arc::clone(&string)));
        registry.insert::<Option<String>>(Arc::new(OptionCodec::<String>::new(Arc::clone(&string))));
        registry.insert::<HashMap<String, String>>(Arc::new(StringMapCodec::<String>::new(string)));

        let int: Arc<dyn ValueCodec> =
            Arc::new(ScalarCodec::<i64>::new(|n| Value::Int(*n), Value::as_int));
        registry.insert::<i64>(Arc::clone(&int));
        registry.insert::<Vec<i64>>(list_of::<i64>(Arc::clone(&int)));
        registry.insert::<Option<i64>>(Arc::new(OptionCodec::<i64>::new(Arc::clone(&int))));
        registry.insert::<HashMap<String, i64>>(Arc::new(StringMapCodec::<i64>::new(int)));

        registry.insert::<i32>(Arc::new(ScalarCodec::<i32>::new(
            |n| Value::Int(i64::from(*n)),
            |v| v.as_int().and_then(|n| i32::try_from(n).ok()),
        )));
        registry.insert::<u32>(Arc::new(ScalarCodec::<u32>::new(
            |n| Value::Int(i64::from(*n)),
            |v| v.as_int().and_then(|n| u32::try_from(n).ok()),
        )));
        registry.insert::<bool>(Arc::new(ScalarCodec::<bool>::new(
            |b| Value::Bool(*b),
            Value::as_bool,
        )));

        let double: Arc<dyn ValueCodec> = Arc::new(ScalarCodec::<f64>::new(
            |d| Value::Double(*d),
            |v| v.as_double().or_else(|| v.as_int().map(|n| n as f64)),
        ));
        registry.insert::<f64>(Arc::clone(&double));
        registry.insert::<Vec<f64>>(list_of::<f64>(double));

        let id: Arc<dyn ValueCodec> =
            Arc::new(ScalarCodec::<EntityId>::new(|i| Value::Id(*i), Value::as_id));
        registry.insert::<EntityId>(Arc::clone(&id));
        registry.insert::<Option<EntityId>>(Arc::new(OptionCodec::<EntityId>::new(id)));

        registry.insert::<Vec<u8>>(Arc::new(ScalarCodec::<Vec<u8>>::new(
            |b| Value::Bytes(b.clone()),
            |v| v.as_bytes().map(<[u8]>::to_vec),
        )));

        registry
    }

    /// Registers a codec for a type signature, replacing any existing one.
    pub fn insert<F: 'static>(&self, codec: Arc<dyn ValueCodec>) {
        self.codecs.write().insert(TypeId::of::<F>(), codec);
    }

    /// Registers a `Vec<F>` codec delegating to the registered `F` codec.
    ///
    /// # Errors
    ///
    /// Fails if no codec is registered for `F`.
    pub fn register_list<F: 'static>(&self) -> CoreResult<()> {
        let inner = self.require::<F>()?;
        self.insert::<Vec<F>>(list_of::<F>(inner));
        Ok(())
    }

    /// Registers an `Option<F>` codec delegating to the registered `F`
    /// codec.
    ///
    /// # Errors
    ///
    /// Fails if no codec is registered for `F`.
    pub fn register_optional<F: 'static>(&self) -> CoreResult<()> {
        let inner = self.require::<F>()?;
        self.insert::<Option<F>>(Arc::new(OptionCodec::<F>::new(inner)));
        Ok(())
    }

    /// Registers a `HashMap<String, F>` codec delegating to the registered
    /// `F` codec.
    ///
    /// # Errors
    ///
    /// Fails if no codec is registered for `F`.
    pub fn register_string_map<F: 'static>(&self) -> CoreResult<()> {
        let inner = self.require::<F>()?;
        self.insert::<HashMap<String, F>>(Arc::new(StringMapCodec::<F>::new(inner)));
        Ok(())
    }

    fn require<F: 'static>(&self) -> CoreResult<Arc<dyn ValueCodec>> {
        self.codecs
            .read()
            .get(&TypeId::of::<F>())
            .cloned()
            .ok_or_else(|| {
                MappingError::no_codec("registry", std::any::type_name::<F>()).into()
            })
    }
}

impl TypeCodecRegistry for DefaultCodecRegistry {
    fn lookup(&self, key: TypeKey) -> Option<Arc<dyn ValueCodec>> {
        self.codecs.read().get(&key.type_id()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Datastore;
    use crate::mapper::Mapper;
    use crate::options::MapperOptions;
    use docmap_store::MemoryStore;

    fn test_datastore() -> Datastore {
        Datastore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Mapper::new(MapperOptions::default())),
        )
    }

    fn roundtrip<F: 'static + Clone>(registry: &DefaultCodecRegistry, value: F) -> F {
        let datastore = test_datastore();
        let codec = registry.lookup(TypeKey::of::<F>()).expect("codec");
        let encoded = codec
            .encode(&value as &dyn Any, &EncodeContext::new(&datastore))
            .unwrap();
        *codec
            .decode(&encoded, &DecodeContext::new(&datastore))
            .unwrap()
            .downcast::<F>()
            .unwrap()
    }

    #[test]
    fn standard_scalars_roundtrip() {
        let registry = DefaultCodecRegistry::standard();
        assert_eq!(roundtrip(&registry, "hello".to_string()), "hello");
        assert_eq!(roundtrip(&registry, 42i64), 42);
        assert_eq!(roundtrip(&registry, -7i32), -7);
        assert_eq!(roundtrip(&registry, true), true);
        assert_eq!(roundtrip(&registry, 2.5f64), 2.5);
        let id = EntityId::new();
        assert_eq!(roundtrip(&registry, id), id);
    }

    #[test]
    fn containers_roundtrip() {
        let registry = DefaultCodecRegistry::standard();
        assert_eq!(
            roundtrip(&registry, vec!["a".to_string(), "b".to_string()]),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(roundtrip(&registry, Some(9i64)), Some(9));
        assert_eq!(roundtrip(&registry, None::<i64>), None);

        let mut map = HashMap::new();
        map.insert("x".to_string(), 1i64);
        map.insert("y".to_string(), 2i64);
        assert_eq!(roundtrip(&registry, map.clone()), map);
    }

    #[test]
    fn map_encoding_is_deterministic() {
        let registry = DefaultCodecRegistry::standard();
        let datastore = test_datastore();
        let codec = registry.lookup(TypeKey::of::<HashMap<String, i64>>()).unwrap();

        let mut map = HashMap::new();
        map.insert("zeta".to_string(), 1i64);
        map.insert("alpha".to_string(), 2i64);

        let encoded = codec
            .encode(&map as &dyn Any, &EncodeContext::new(&datastore))
            .unwrap();
        let doc = encoded.as_document().unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn lookup_unregistered_returns_none() {
        let registry = DefaultCodecRegistry::standard();
        struct Custom;
        assert!(registry.lookup(TypeKey::of::<Custom>()).is_none());
    }

    #[test]
    fn register_list_requires_element_codec() {
        let registry = DefaultCodecRegistry::new();
        assert!(registry.register_list::<String>().is_err());

        let registry = DefaultCodecRegistry::standard();
        registry.register_list::<bool>().unwrap();
        assert_eq!(
            roundtrip(&registry, vec![true, false]),
            vec![true, false]
        );
    }

    #[test]
    fn decode_wrong_shape_fails() {
        let registry = DefaultCodecRegistry::standard();
        let datastore = test_datastore();
        let codec = registry.lookup(TypeKey::of::<i64>()).unwrap();
        let err = codec
            .decode(&Value::Text("nope".into()), &DecodeContext::new(&datastore))
            .unwrap_err();
        assert!(err.to_string().contains("invalid value"));
    }
}
