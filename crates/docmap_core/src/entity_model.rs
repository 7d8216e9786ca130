//! Immutable description of one mapped type.

use crate::error::MappingError;
use crate::field_model::FieldModel;
use crate::options::MapperOptions;
use crate::spec::{CreatorSpec, EntityKind, EntitySpec, LifecycleCallback, LifecycleEvent};
use crate::type_key::TypeKey;
use docmap_document::Document;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Structural description of one mapped type.
///
/// Created once per distinct runtime type the first time that type is
/// mapped; cached for the life of the owning registry and never mutated
/// after discovery completes, except for the one-time codec-specialization
/// pass on its fields.
pub struct EntityModel {
    key: TypeKey,
    kind: EntityKind,
    is_abstract: bool,
    name: &'static str,
    collection: Option<String>,
    discriminator_key: String,
    discriminator: String,
    fields: Vec<Arc<FieldModel>>,
    creator: Option<CreatorSpec>,
    lifecycle: Vec<(LifecycleEvent, LifecycleCallback)>,
    extends: Option<TypeKey>,
    implements: Vec<TypeKey>,
}

impl EntityModel {
    /// Builds a model from a declarative spec.
    ///
    /// Fields are ordered with inherited declarations first (in ancestor
    /// declaration order), then the type's own declarations in source
    /// order; the stored document mirrors this ordering. Transient fields
    /// are skipped with a log line, never an error.
    pub(crate) fn build(spec: EntitySpec, options: &MapperOptions) -> Result<Self, MappingError> {
        let EntitySpec {
            key,
            kind,
            is_abstract,
            name,
            collection,
            discriminator,
            extends,
            implements,
            creator,
            lifecycle,
            fields,
        } = spec;

        let inherited = extends.map(ancestor_field_names).unwrap_or_default();

        let mut remaining = fields;
        let mut ordered = Vec::with_capacity(remaining.len());
        for inherited_name in &inherited {
            if let Some(pos) = remaining.iter().position(|f| f.name == *inherited_name) {
                ordered.push(remaining.remove(pos));
            }
        }
        ordered.append(&mut remaining);

        let mut models = Vec::with_capacity(ordered.len());
        for field in ordered {
            if field.transient {
                debug!(entity = name, field = field.name, "ignoring transient field");
                continue;
            }
            models.push(Arc::new(FieldModel::new(field, key, options.field_naming)));
        }

        if let Some(CreatorSpec::Constructor { params, .. }) = &creator {
            check_constructor_parameters(name, params, &models)?;
        }

        let collection = match kind {
            EntityKind::Entity => Some(
                collection.map_or_else(|| options.collection_naming.apply(name), str::to_string),
            ),
            EntityKind::Embedded | EntityKind::Interface => None,
        };

        Ok(Self {
            key,
            kind,
            is_abstract,
            name,
            collection,
            discriminator_key: options.discriminator_key.clone(),
            discriminator: discriminator.unwrap_or(name).to_string(),
            fields: models,
            creator,
            lifecycle,
            extends: extends.map(|link| link.key),
            implements: implements.into_iter().map(|link| link.key).collect(),
        })
    }

    /// The described type.
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The kind of mapped type.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// True if the type is mapped but can never be instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// The declared entity name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The effective collection name; `None` for embedded and interface
    /// types, which are never stored top-level.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// The document key the discriminator is stored under.
    #[must_use]
    pub fn discriminator_key(&self) -> &str {
        &self.discriminator_key
    }

    /// The discriminator value identifying this concrete type.
    #[must_use]
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// The ordered field models.
    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldModel>] {
        &self.fields
    }

    /// The declared supertype, if any.
    #[must_use]
    pub fn extends(&self) -> Option<TypeKey> {
        self.extends
    }

    /// The declared interfaces.
    #[must_use]
    pub fn implements(&self) -> &[TypeKey] {
        &self.implements
    }

    pub(crate) fn creator(&self) -> Option<&CreatorSpec> {
        self.creator.as_ref()
    }

    /// True if any lifecycle callback is registered.
    #[must_use]
    pub fn has_any_lifecycle(&self) -> bool {
        !self.lifecycle.is_empty()
    }

    /// True if a callback is registered for the event.
    #[must_use]
    pub fn has_lifecycle(&self, event: LifecycleEvent) -> bool {
        self.lifecycle.iter().any(|(e, _)| *e == event)
    }

    /// Runs entity-level callbacks registered for the event.
    pub(crate) fn call_entity_event(&self, event: LifecycleEvent, instance: &mut dyn Any) {
        for (registered, callback) in &self.lifecycle {
            if *registered == event {
                if let LifecycleCallback::Entity(f) = callback {
                    f(instance);
                }
            }
        }
    }

    /// Runs document-level callbacks registered for the event.
    pub(crate) fn call_document_event(&self, event: LifecycleEvent, document: &mut Document) {
        for (registered, callback) in &self.lifecycle {
            if *registered == event {
                if let LifecycleCallback::Document(f) = callback {
                    f(document);
                }
            }
        }
    }
}

impl fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("type", &self.key)
            .field("kind", &self.kind)
            .field("collection", &self.collection)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Collects declared field names along the ancestor chain, topmost
/// ancestor first.
fn ancestor_field_names(link: crate::spec::SpecLink) -> Vec<&'static str> {
    let spec = (link.spec)();
    let mut names = spec.extends.map(ancestor_field_names).unwrap_or_default();
    for field in &spec.fields {
        if !names.contains(&field.name) {
            names.push(field.name);
        }
    }
    names
}

fn check_constructor_parameters(
    type_name: &'static str,
    params: &[&'static str],
    fields: &[Arc<FieldModel>],
) -> Result<(), MappingError> {
    let mut seen: Vec<&str> = Vec::with_capacity(params.len());
    for param in params {
        if seen.contains(param) {
            return Err(MappingError::DuplicatedParameterName {
                type_name: type_name.to_string(),
                parameter: (*param).to_string(),
            });
        }
        seen.push(param);
        if !fields.iter().any(|f| f.name() == *param) {
            return Err(MappingError::UnmatchedConstructorParameter {
                type_name: type_name.to_string(),
                parameter: (*param).to_string(),
            });
        }
    }
    for field in fields {
        if !params.contains(&field.name()) {
            return Err(MappingError::MissingConstructorParameter {
                type_name: type_name.to_string(),
                field: field.name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ArgBag, FieldSpec, Mappable, SpecLink};
    use docmap_document::EntityId;

    #[derive(Default)]
    struct Shape {
        id: Option<EntityId>,
        description: String,
    }

    impl Mappable for Shape {
        fn entity_spec() -> EntitySpec {
            EntitySpec::abstract_entity::<Shape>("Shape")
                .collection("shapes")
                .field(FieldSpec::id(
                    "id",
                    |s: &Shape| s.id,
                    |s: &mut Shape, id| s.id = Some(id),
                ))
                .field(FieldSpec::scalar(
                    "description",
                    |s: &Shape| &s.description,
                    |s: &mut Shape, v| s.description = v,
                ))
        }
    }

    #[derive(Default)]
    struct Circle {
        id: Option<EntityId>,
        description: String,
        radius: f64,
    }

    impl Mappable for Circle {
        fn entity_spec() -> EntitySpec {
            // The inherited declarations are listed last on purpose: the
            // model must still order them first.
            EntitySpec::entity::<Circle>("Circle")
                .collection("shapes")
                .extends(SpecLink::to::<Shape>())
                .field(FieldSpec::scalar(
                    "radius",
                    |c: &Circle| &c.radius,
                    |c: &mut Circle, v| c.radius = v,
                ))
                .field(FieldSpec::id(
                    "id",
                    |c: &Circle| c.id,
                    |c: &mut Circle, id| c.id = Some(id),
                ))
                .field(FieldSpec::scalar(
                    "description",
                    |c: &Circle| &c.description,
                    |c: &mut Circle, v| c.description = v,
                ))
        }
    }

    #[test]
    fn superclass_fields_come_first() {
        let model = EntityModel::build(Circle::entity_spec(), &MapperOptions::default()).unwrap();
        let names: Vec<&str> = model.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["id", "description", "radius"]);
    }

    #[test]
    fn transient_fields_are_skipped() {
        #[derive(Default)]
        struct Cached {
            id: Option<EntityId>,
            value: String,
            scratch: String,
        }

        let spec = EntitySpec::entity::<Cached>("Cached")
            .field(FieldSpec::id(
                "id",
                |c: &Cached| c.id,
                |c: &mut Cached, id| c.id = Some(id),
            ))
            .field(FieldSpec::scalar(
                "value",
                |c: &Cached| &c.value,
                |c: &mut Cached, v| c.value = v,
            ))
            .field(
                FieldSpec::scalar(
                    "scratch",
                    |c: &Cached| &c.scratch,
                    |c: &mut Cached, v| c.scratch = v,
                )
                .transient(),
            );

        let model = EntityModel::build(spec, &MapperOptions::default()).unwrap();
        assert!(model.fields().iter().all(|f| f.name() != "scratch"));
        assert_eq!(model.fields().len(), 2);
    }

    #[test]
    fn stored_names_use_naming_strategy() {
        #[derive(Default)]
        struct Profile {
            id: Option<EntityId>,
            display_name: String,
        }

        let spec = EntitySpec::entity::<Profile>("Profile")
            .field(FieldSpec::id(
                "id",
                |p: &Profile| p.id,
                |p: &mut Profile, id| p.id = Some(id),
            ))
            .field(FieldSpec::scalar(
                "display_name",
                |p: &Profile| &p.display_name,
                |p: &mut Profile, v| p.display_name = v,
            ));

        let options = MapperOptions::new().field_naming(crate::naming::NamingStrategy::CamelCase);
        let model = EntityModel::build(spec, &options).unwrap();
        let field = model
            .fields()
            .iter()
            .find(|f| f.name() == "display_name")
            .unwrap();
        assert_eq!(field.stored_name(), "displayName");
        // The identifier's stored name is fixed, never strategy-derived.
        let id = model.fields().iter().find(|f| f.is_id()).unwrap();
        assert_eq!(id.stored_name(), "_id");
    }

    fn point_spec(params: &'static [&'static str]) -> EntitySpec {
        struct Point {
            id: Option<EntityId>,
            x: i64,
        }

        EntitySpec::entity_using::<Point>(
            "Point",
            CreatorSpec::constructor(params, |args: &mut ArgBag| {
                Ok(Box::new(Point {
                    id: args.take("id")?,
                    x: args.take("x")?,
                }) as Box<dyn Any>)
            }),
        )
        .field(FieldSpec::id(
            "id",
            |p: &Point| p.id,
            |p: &mut Point, id| p.id = Some(id),
        ))
        .field(FieldSpec::scalar(
            "x",
            |p: &Point| &p.x,
            |p: &mut Point, v| p.x = v,
        ))
    }

    #[test]
    fn constructor_parameters_must_match_fields() {
        assert!(EntityModel::build(point_spec(&["id", "x"]), &MapperOptions::default()).is_ok());

        let err = EntityModel::build(point_spec(&["id", "y"]), &MapperOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::UnmatchedConstructorParameter { .. }
        ));

        let err = EntityModel::build(point_spec(&["id", "id", "x"]), &MapperOptions::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::DuplicatedParameterName { .. }));

        let err =
            EntityModel::build(point_spec(&["id"]), &MapperOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingConstructorParameter { .. }
        ));
    }
}
