//! Inheritance-aware wrapper over an entity model.

use crate::entity_model::EntityModel;
use crate::error::MappingError;
use crate::field_model::FieldModel;
use crate::spec::{EntityKind, LifecycleEvent};
use crate::type_key::TypeKey;
use docmap_document::Document;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A mapped type, with its identifier and version fields resolved.
///
/// Constructed immediately after its [`EntityModel`] exists; resolution of
/// the identifier and version fields runs synchronously in the
/// constructor. Never reconstructed for the same type within one
/// registry's lifetime. Supertype/subtype links live in the registry's
/// graph, keyed by type identity, so they survive out-of-order mapping.
pub struct MappedClass {
    model: EntityModel,
    id_field: Option<Arc<FieldModel>>,
    version_field: Option<Arc<FieldModel>>,
}

impl MappedClass {
    /// Wraps a model, resolving the identifier and version fields.
    ///
    /// # Errors
    ///
    /// - a concrete entity type with no identifier field
    /// - an identifier marker on an embedded or interface type
    pub(crate) fn new(model: EntityModel) -> Result<Self, MappingError> {
        let id_fields: Vec<Arc<FieldModel>> = model
            .fields()
            .iter()
            .filter(|f| f.is_id())
            .cloned()
            .collect();

        match model.kind() {
            EntityKind::Entity => {
                if id_fields.is_empty() && !model.is_abstract() {
                    return Err(MappingError::missing_id_field(model.name()));
                }
            }
            EntityKind::Embedded | EntityKind::Interface => {
                if let Some(field) = id_fields.first() {
                    return Err(MappingError::id_on_non_entity(model.name(), field.name()));
                }
            }
        }

        // Duplicate version markers are collected by the validator chain,
        // not rejected here; the first declaration is the candidate.
        let version_field = model.fields().iter().find(|f| f.is_version()).cloned();
        let id_field = id_fields.into_iter().next();

        Ok(Self {
            model,
            id_field,
            version_field,
        })
    }

    /// The underlying model.
    #[must_use]
    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    /// The mapped type's identity.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.model.key()
    }

    /// The kind of mapped type.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.model.kind()
    }

    /// The declared entity name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.model.name()
    }

    /// The effective collection name, for entity types.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.model.collection()
    }

    /// The ordered mapped fields (superclass declarations first).
    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldModel>] {
        self.model.fields()
    }

    /// The resolved identifier field.
    #[must_use]
    pub fn id_field(&self) -> Option<&Arc<FieldModel>> {
        self.id_field.as_ref()
    }

    /// The resolved version field.
    #[must_use]
    pub fn version_field(&self) -> Option<&Arc<FieldModel>> {
        self.version_field.as_ref()
    }

    /// True for abstract types, which are mapped but never instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.model.is_abstract()
    }

    /// True for interface marker types.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.model.kind() == EntityKind::Interface
    }

    /// True for embedded types.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.model.kind() == EntityKind::Embedded
    }

    /// The discriminator value identifying this concrete type.
    #[must_use]
    pub fn discriminator(&self) -> &str {
        self.model.discriminator()
    }

    /// The document key the discriminator is stored under.
    #[must_use]
    pub fn discriminator_key(&self) -> &str {
        self.model.discriminator_key()
    }

    /// Finds a field by its stored name, or failing that by its declared
    /// name.
    #[must_use]
    pub fn field_by_stored_name(&self, name: &str) -> Option<&Arc<FieldModel>> {
        self.fields()
            .iter()
            .find(|f| f.stored_name() == name || f.name() == name)
    }

    /// Finds a field by its declared name only.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<FieldModel>> {
        self.fields().iter().find(|f| f.name() == name)
    }

    /// Fields holding references to foreign entities.
    #[must_use]
    pub fn reference_fields(&self) -> Vec<&Arc<FieldModel>> {
        self.fields().iter().filter(|f| f.is_reference()).collect()
    }

    /// True if a callback is registered for the event.
    #[must_use]
    pub fn has_lifecycle(&self, event: LifecycleEvent) -> bool {
        self.model.has_lifecycle(event)
    }

    pub(crate) fn call_entity_event(&self, event: LifecycleEvent, instance: &mut dyn Any) {
        self.model.call_entity_event(event, instance);
    }

    pub(crate) fn call_document_event(&self, event: LifecycleEvent, document: &mut Document) {
        self.model.call_document_event(event, document);
    }
}

impl fmt::Debug for MappedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]",
            self.name(),
            self.collection().unwrap_or("embedded")
        )
    }
}

impl PartialEq for MappedClass {
    fn eq(&self, other: &Self) -> bool {
        self.type_key() == other.type_key()
    }
}

impl Eq for MappedClass {}
