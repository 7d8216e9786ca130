//! The datastore facade.

use crate::codec::{DecodeContext, EncodeContext};
use crate::error::{CoreError, CoreResult, MappingError};
use crate::field_model::FieldModel;
use crate::mapper::Mapper;
use crate::spec::{EntityKind, LifecycleEvent, Mappable};
use crate::type_key::TypeKey;
use docmap_document::{Document, EntityId, Value};
use docmap_store::DocumentStore;
use std::any::Any;
use std::sync::Arc;

/// A datastore: a storage driver paired with a mapper.
///
/// Cloning is cheap (a shared handle); references decoded from documents
/// hold a clone so they can resolve later.
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<DatastoreInner>,
}

struct DatastoreInner {
    driver: Arc<dyn DocumentStore>,
    mapper: Arc<Mapper>,
}

impl Datastore {
    /// Creates a datastore over a driver and mapper.
    #[must_use]
    pub fn new(driver: Arc<dyn DocumentStore>, mapper: Arc<Mapper>) -> Self {
        Self {
            inner: Arc::new(DatastoreInner { driver, mapper }),
        }
    }

    /// The mapper registry.
    #[must_use]
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.inner.mapper
    }

    /// The storage driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.driver
    }

    /// Encodes an entity to its stored document form, mapping the type
    /// first if needed.
    ///
    /// # Errors
    ///
    /// Fails if the type cannot be mapped or a field cannot be encoded.
    pub fn encode<T: Mappable>(&self, entity: &T) -> CoreResult<Document> {
        let mapped = self.inner.mapper.map::<T>()?;
        let codec = self
            .inner
            .mapper
            .codec_by_type(mapped.type_key().type_id())
            .ok_or_else(|| MappingError::not_mapped(mapped.name()))?;
        codec.encode(entity, &EncodeContext::new(self))
    }

    /// Decodes a document into an entity, mapping the type first if
    /// needed. Pre-load and post-load callbacks run around the decode.
    ///
    /// # Errors
    ///
    /// Fails if the type cannot be mapped, the document cannot be decoded,
    /// or the decoded concrete type is not `T`.
    pub fn decode<T: Mappable>(&self, document: Document) -> CoreResult<T> {
        let mapped = self.inner.mapper.map::<T>()?;
        let instance = self.decode_dynamic(mapped.type_key(), document)?;
        match instance.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(_) => {
                Err(MappingError::type_mismatch(std::any::type_name::<T>(), "decode").into())
            }
        }
    }

    /// Saves an entity.
    ///
    /// An unset identifier is generated and installed on the instance
    /// before encoding, an observable side effect. Versioned types go
    /// through a conditional replace on (identifier, expected version);
    /// zero modified documents surfaces as a concurrent-modification
    /// error and the in-memory version is restored.
    ///
    /// # Errors
    ///
    /// Fails on mapping errors, driver errors, or a lost version race.
    pub fn save<T: Mappable>(&self, entity: &mut T) -> CoreResult<EntityId> {
        let mapped = self.inner.mapper.map::<T>()?;
        if mapped.kind() != EntityKind::Entity || mapped.is_abstract() {
            return Err(MappingError::NotPersistable {
                type_name: mapped.name().to_string(),
            }
            .into());
        }
        let collection = mapped
            .collection()
            .ok_or_else(|| MappingError::NotPersistable {
                type_name: mapped.name().to_string(),
            })?
            .to_string();
        let codec = self
            .inner
            .mapper
            .codec_by_type(mapped.type_key().type_id())
            .ok_or_else(|| MappingError::not_mapped(mapped.name()))?;

        mapped.call_entity_event(LifecycleEvent::PrePersist, entity);
        let (id, generated) = codec.ensure_id(entity)?;

        match mapped.version_field().cloned() {
            Some(version_field) => {
                let current = version_value(&version_field, &*entity)?;
                if current == 0 {
                    // Fresh entity: first version is 1, written by insert.
                    set_version(&version_field, entity, 1)?;
                    let document = codec.encode(&*entity, &EncodeContext::new(self))?;
                    if let Err(error) = self.inner.driver.insert(&collection, document) {
                        set_version(&version_field, entity, current)?;
                        return Err(error.into());
                    }
                } else {
                    let next = current + 1;
                    set_version(&version_field, entity, next)?;
                    let document = codec.encode(&*entity, &EncodeContext::new(self))?;
                    let outcome = self.inner.driver.replace(
                        &collection,
                        &Value::Id(id),
                        Some((version_field.stored_name(), current)),
                        document,
                    );
                    let modified = match outcome {
                        Ok(n) => n,
                        Err(error) => {
                            set_version(&version_field, entity, current)?;
                            return Err(error.into());
                        }
                    };
                    if modified == 0 {
                        set_version(&version_field, entity, current)?;
                        return Err(CoreError::concurrent_modification(collection, id, current));
                    }
                }
            }
            None => {
                let document = codec.encode(&*entity, &EncodeContext::new(self))?;
                if generated {
                    self.inner.driver.insert(&collection, document)?;
                } else {
                    let modified = self.inner.driver.replace(
                        &collection,
                        &Value::Id(id),
                        None,
                        document.clone(),
                    )?;
                    if modified == 0 {
                        self.inner.driver.insert(&collection, document)?;
                    }
                }
            }
        }

        mapped.call_entity_event(LifecycleEvent::PostPersist, entity);
        Ok(id)
    }

    /// Loads an entity by identifier.
    ///
    /// # Errors
    ///
    /// Fails on mapping errors, driver errors, or when the stored document
    /// decodes to a different concrete type.
    pub fn find<T: Mappable>(&self, id: EntityId) -> CoreResult<Option<T>> {
        let mapped = self.inner.mapper.map::<T>()?;
        let collection = mapped
            .collection()
            .ok_or_else(|| MappingError::NotPersistable {
                type_name: mapped.name().to_string(),
            })?;
        let Some(document) = self.inner.driver.find_one(collection, &Value::Id(id))? else {
            return Ok(None);
        };
        let instance = self.decode_dynamic(mapped.type_key(), document)?;
        match instance.downcast::<T>() {
            Ok(boxed) => Ok(Some(*boxed)),
            Err(_) => {
                Err(MappingError::type_mismatch(std::any::type_name::<T>(), "find").into())
            }
        }
    }

    /// Decodes a document against an already-mapped target type, running
    /// lifecycle callbacks. Used by typed decode and by reference
    /// resolution.
    pub(crate) fn decode_dynamic(
        &self,
        target: TypeKey,
        mut document: Document,
    ) -> CoreResult<Box<dyn Any>> {
        let mapper = &self.inner.mapper;
        let mapped = mapper
            .class_by_type(target.type_id())
            .ok_or_else(|| MappingError::not_mapped(target.name()))?;
        let codec = mapper
            .codec_by_type(target.type_id())
            .ok_or_else(|| MappingError::not_mapped(target.name()))?;

        mapped.call_document_event(LifecycleEvent::PreLoad, &mut document);
        let mut instance = codec.decode(&document, &DecodeContext::new(self))?;

        // Post-load runs on the concrete decoded type, which may be a
        // subtype of the requested target.
        let concrete_id = instance.as_ref().type_id();
        if let Some(concrete) = mapper.class_by_type(concrete_id) {
            concrete.call_entity_event(LifecycleEvent::PostLoad, &mut *instance);
        }
        Ok(instance)
    }
}

fn version_value(field: &Arc<FieldModel>, entity: &dyn Any) -> CoreResult<i64> {
    let value = field.get_value(entity)?;
    match value.downcast::<i64>() {
        Ok(boxed) => Ok(*boxed),
        Err(_) => Err(MappingError::type_mismatch("i64", field.full_name()).into()),
    }
}

fn set_version(field: &Arc<FieldModel>, entity: &mut dyn Any, version: i64) -> CoreResult<()> {
    field.set_value(entity, Box::new(version))
}
