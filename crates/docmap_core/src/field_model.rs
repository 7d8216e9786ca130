//! Immutable description of one persisted field.

use crate::codec::ValueCodec;
use crate::error::{CoreResult, MappingError};
use crate::naming::NamingStrategy;
use crate::spec::{EmbeddedSpec, FieldAccessors, FieldSpec, IdAccessors, ReferenceSpec};
use crate::type_key::TypeKey;
use docmap_document::{Document, EntityId, Value};
use docmap_store::ID_FIELD;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Structural description of one mapped field.
///
/// Built once when the declaring type is first mapped; immutable afterwards
/// except for the cached specialized codec, which is set exactly once
/// during codec generation.
pub struct FieldModel {
    declaring: TypeKey,
    name: &'static str,
    stored_name: String,
    load_names: Vec<String>,
    type_key: TypeKey,
    element: Option<TypeKey>,
    map_shaped: bool,
    is_id: bool,
    is_version: bool,
    accessors: Option<FieldAccessors>,
    id_accessors: Option<IdAccessors>,
    embedded: Option<EmbeddedSpec>,
    reference: Option<ReferenceSpec>,
    codec: OnceLock<Arc<dyn ValueCodec>>,
}

impl FieldModel {
    pub(crate) fn new(spec: FieldSpec, declaring: TypeKey, naming: NamingStrategy) -> Self {
        let stored_name = if spec.is_id {
            ID_FIELD.to_string()
        } else {
            spec.stored_name
                .map_or_else(|| naming.apply(spec.name), str::to_string)
        };
        let mut load_names = vec![stored_name.clone()];
        load_names.extend(spec.aliases.iter().map(|a| (*a).to_string()));

        Self {
            declaring,
            name: spec.name,
            stored_name,
            load_names,
            type_key: spec.type_key,
            element: spec.element,
            map_shaped: spec.map_shaped,
            is_id: spec.is_id,
            is_version: spec.is_version,
            accessors: spec.accessors,
            id_accessors: spec.id_accessors,
            embedded: spec.embedded,
            reference: spec.reference,
            codec: OnceLock::new(),
        }
    }

    /// The declared (in-memory) field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The primary stored name.
    #[must_use]
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    /// All names this field may be loaded from, primary name first.
    #[must_use]
    pub fn load_names(&self) -> &[String] {
        &self.load_names
    }

    /// The type that declared this field.
    #[must_use]
    pub fn declaring(&self) -> TypeKey {
        self.declaring
    }

    /// The field's full declared type.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// The element type for container and embedded fields, if any.
    #[must_use]
    pub fn element(&self) -> Option<TypeKey> {
        self.element
    }

    /// True for string-keyed map fields, whose keys are opaque to path
    /// resolution.
    #[must_use]
    pub fn is_map_shaped(&self) -> bool {
        self.map_shaped
    }

    /// True if this is the identifier field.
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.is_id
    }

    /// True if this is the optimistic-concurrency version field.
    #[must_use]
    pub fn is_version(&self) -> bool {
        self.is_version
    }

    /// True if this field holds a reference to foreign entities.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Qualified `Type.field` name for diagnostics.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.declaring.short_name(), self.name)
    }

    pub(crate) fn embedded(&self) -> Option<&EmbeddedSpec> {
        self.embedded.as_ref()
    }

    pub(crate) fn reference(&self) -> Option<&ReferenceSpec> {
        self.reference.as_ref()
    }

    /// The specialized codec, once codec generation has run.
    #[must_use]
    pub fn cached_codec(&self) -> Option<Arc<dyn ValueCodec>> {
        self.codec.get().cloned()
    }

    /// Caches the specialized codec. The first call wins; later calls are
    /// ignored (specialization runs once per registry).
    pub(crate) fn cache_codec(&self, codec: Arc<dyn ValueCodec>) {
        let _ = self.codec.set(codec);
    }

    /// Reads this field's value from an instance, as an erased clone.
    pub(crate) fn get_value(&self, instance: &dyn Any) -> CoreResult<Box<dyn Any>> {
        let accessors = self.accessors.as_ref().ok_or_else(|| {
            MappingError::type_mismatch(self.declaring.name(), self.full_name())
        })?;
        (accessors.get)(instance)
            .ok_or_else(|| MappingError::type_mismatch(self.declaring.name(), self.full_name()).into())
    }

    /// Writes a decoded value into an instance.
    pub(crate) fn set_value(&self, instance: &mut dyn Any, value: Box<dyn Any>) -> CoreResult<()> {
        let accessors = self.accessors.as_ref().ok_or_else(|| {
            MappingError::type_mismatch(self.declaring.name(), self.full_name())
        })?;
        if (accessors.set)(instance, value) {
            Ok(())
        } else {
            Err(MappingError::type_mismatch(self.type_key.name(), self.full_name()).into())
        }
    }

    /// Reads the identifier from an instance; `None` while unset.
    pub(crate) fn id_value(&self, instance: &dyn Any) -> Option<EntityId> {
        self.id_accessors.as_ref().and_then(|a| (a.get)(instance))
    }

    /// Installs an identifier on an instance.
    pub(crate) fn set_id(&self, instance: &mut dyn Any, id: EntityId) -> CoreResult<()> {
        let accessors = self.id_accessors.as_ref().ok_or_else(|| {
            MappingError::type_mismatch("identifier field", self.full_name())
        })?;
        if (accessors.set)(instance, id) {
            Ok(())
        } else {
            Err(MappingError::type_mismatch(self.declaring.name(), self.full_name()).into())
        }
    }

    /// Locates this field's value in a document, falling back through the
    /// also-load names in declared order.
    ///
    /// # Errors
    ///
    /// Fails if more than one candidate name is present simultaneously.
    pub fn document_value<'a>(&self, document: &'a Document) -> CoreResult<Option<&'a Value>> {
        let present: Vec<&str> = self
            .load_names
            .iter()
            .map(String::as_str)
            .filter(|name| document.contains_key(name))
            .collect();
        match present.as_slice() {
            [] => Ok(None),
            [name] => Ok(document.get(name)),
            names => Err(MappingError::ambiguous_stored_field(self.full_name(), names).into()),
        }
    }
}

impl fmt::Debug for FieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldModel")
            .field("name", &self.name)
            .field("stored_name", &self.stored_name)
            .field("type", &self.type_key)
            .field("is_id", &self.is_id)
            .field("is_version", &self.is_version)
            .finish()
    }
}
