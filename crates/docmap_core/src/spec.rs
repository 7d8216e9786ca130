//! Declarative entity registration.
//!
//! Rust has no runtime reflection, so mapped types describe themselves
//! once: implementing [`Mappable`] is the "this is an entity/embeddable"
//! marker, and [`Mappable::entity_spec`] returns the declarative
//! [`EntitySpec`] the mapper turns into its immutable descriptor tree.
//! Field access goes through type-erased accessor pairs built from plain
//! fn pointers; no macros, no unsafe.

use crate::codec::ValueCodec;
use crate::error::{CoreResult, MappingError};
use crate::refs::{
    unerase_list, unerase_map, unerase_set, unerase_single, wrap_list, wrap_map, wrap_set,
    wrap_single, AnyReference, ListRef, MapRef, RefSeed, SetRef, SingleRef,
};
use crate::type_key::TypeKey;
use docmap_document::{Document, EntityId};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Marker trait for mapped types.
///
/// Implementing `Mappable` is what makes a type recognizable to the
/// mapper, independent of whether it has been mapped yet. The spec it
/// returns is read exactly once per registry, the first time the type is
/// mapped.
pub trait Mappable: Send + Sync + Sized + 'static {
    /// Returns the declarative description of this type.
    fn entity_spec() -> EntitySpec;
}

/// What kind of mapped type a spec describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A top-level type with its own identifier and collection.
    Entity,
    /// A type persisted only as a nested value inside an owning document.
    Embedded,
    /// A pure marker type other specs implement; carries no fields of its
    /// own and is never instantiated.
    Interface,
}

/// A link from one spec to another mapped type's spec.
///
/// Links carry the target's spec function so discovery can consult an
/// ancestor's declarations even before the ancestor itself is mapped.
#[derive(Clone, Copy)]
pub struct SpecLink {
    pub(crate) key: TypeKey,
    pub(crate) spec: fn() -> EntitySpec,
}

impl SpecLink {
    /// Creates a link to another mappable type.
    #[must_use]
    pub fn to<P: Mappable>() -> Self {
        Self {
            key: TypeKey::of::<P>(),
            spec: P::entity_spec,
        }
    }
}

/// Lifecycle points at which registered callbacks fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Before an entity is encoded for a save.
    PrePersist,
    /// After a save completes.
    PostPersist,
    /// Before a loaded document is decoded (receives the raw document).
    PreLoad,
    /// After an instance has been decoded.
    PostLoad,
}

/// A registered lifecycle callback.
pub(crate) enum LifecycleCallback {
    /// Runs against the in-memory instance.
    Entity(Box<dyn Fn(&mut dyn Any) + Send + Sync>),
    /// Runs against the raw document (pre-load only).
    Document(Box<dyn Fn(&mut Document) + Send + Sync>),
}

/// Decoded constructor arguments, keyed by parameter name.
///
/// A constructor-creator build function drains this bag exactly once per
/// decoded instance.
#[derive(Default)]
pub struct ArgBag {
    slots: HashMap<&'static str, Box<dyn Any>>,
}

impl ArgBag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put(&mut self, name: &'static str, value: Box<dyn Any>) {
        self.slots.insert(name, value);
    }

    /// Takes the decoded value for a parameter.
    ///
    /// # Errors
    ///
    /// Fails if the parameter has no decoded value or the value does not
    /// carry the requested type.
    pub fn take<F: 'static>(&mut self, name: &str) -> CoreResult<F> {
        let value = self
            .slots
            .remove(name)
            .ok_or_else(|| MappingError::ConstructorArgument {
                parameter: name.to_string(),
                message: "no decoded value".to_string(),
            })?;
        match value.downcast::<F>() {
            Ok(boxed) => Ok(*boxed),
            Err(_) => Err(MappingError::ConstructorArgument {
                parameter: name.to_string(),
                message: format!("expected {}", std::any::type_name::<F>()),
            }
            .into()),
        }
    }
}

/// How instances of a mapped type are created during decode.
pub enum CreatorSpec {
    /// No-argument construction followed by per-field injection.
    Default(fn() -> Box<dyn Any>),
    /// A designated all-fields constructor matched to fields by parameter
    /// name.
    Constructor {
        /// Declared parameter names, one per mapped field.
        params: &'static [&'static str],
        /// Builds the instance from the decoded arguments.
        build: fn(&mut ArgBag) -> CoreResult<Box<dyn Any>>,
    },
}

impl CreatorSpec {
    /// Creates a default-construction strategy for `T`.
    #[must_use]
    pub fn default_for<T: Default + 'static>() -> Self {
        Self::Default(|| Box::new(T::default()))
    }

    /// Creates a named-parameter constructor strategy.
    #[must_use]
    pub fn constructor(
        params: &'static [&'static str],
        build: fn(&mut ArgBag) -> CoreResult<Box<dyn Any>>,
    ) -> Self {
        Self::Constructor { params, build }
    }
}

/// Type-erased get/set pair for one field.
pub(crate) struct FieldAccessors {
    pub(crate) get: Box<dyn Fn(&dyn Any) -> Option<Box<dyn Any>> + Send + Sync>,
    pub(crate) set: Box<dyn Fn(&mut dyn Any, Box<dyn Any>) -> bool + Send + Sync>,
}

/// Type-erased access to an identifier field.
///
/// `get` returns `None` while the identifier is unset; `set` installs a
/// generated identifier on the instance.
pub(crate) struct IdAccessors {
    pub(crate) get: Box<dyn Fn(&dyn Any) -> Option<EntityId> + Send + Sync>,
    pub(crate) set: Box<dyn Fn(&mut dyn Any, EntityId) -> bool + Send + Sync>,
}

/// The declared shape of a reference field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefShape {
    /// A single foreign entity.
    Single,
    /// An ordered list of foreign entities.
    List,
    /// An unordered set of foreign entities (deduplicated by identifier).
    Set,
    /// A string-keyed map of foreign entities.
    Map,
}

/// Declaration of a field whose element type is itself mapped.
#[derive(Clone, Copy)]
pub(crate) struct EmbeddedSpec {
    pub(crate) target: TypeKey,
    pub(crate) spec: fn() -> EntitySpec,
    /// Wraps the element codec for container shapes (e.g. a list of
    /// embedded values); `None` uses the element codec directly.
    pub(crate) wrap_codec: Option<fn(Arc<dyn ValueCodec>) -> Arc<dyn ValueCodec>>,
}

/// Declaration of a reference field.
#[derive(Clone, Copy)]
pub(crate) struct ReferenceSpec {
    pub(crate) shape: RefShape,
    pub(crate) target: TypeKey,
    pub(crate) spec: fn() -> EntitySpec,
    pub(crate) lazy: bool,
    pub(crate) ignore_missing: bool,
    pub(crate) wrap: fn(RefSeed) -> CoreResult<Box<dyn Any>>,
    pub(crate) as_reference: fn(&dyn Any) -> Option<&dyn AnyReference>,
}

/// Declarative description of one persisted field.
///
/// Built by the constructors below and refined with the chained markers
/// (`stored_as`, `also_load`, `transient`, `lazy`, `ignore_missing`).
pub struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) stored_name: Option<&'static str>,
    pub(crate) aliases: Vec<&'static str>,
    pub(crate) type_key: TypeKey,
    pub(crate) element: Option<TypeKey>,
    pub(crate) map_shaped: bool,
    pub(crate) transient: bool,
    pub(crate) is_id: bool,
    pub(crate) is_version: bool,
    pub(crate) accessors: Option<FieldAccessors>,
    pub(crate) id_accessors: Option<IdAccessors>,
    pub(crate) embedded: Option<EmbeddedSpec>,
    pub(crate) reference: Option<ReferenceSpec>,
}

impl FieldSpec {
    fn base(name: &'static str, type_key: TypeKey) -> Self {
        Self {
            name,
            stored_name: None,
            aliases: Vec::new(),
            type_key,
            element: None,
            map_shaped: false,
            transient: false,
            is_id: false,
            is_version: false,
            accessors: None,
            id_accessors: None,
            embedded: None,
            reference: None,
        }
    }

    fn cloning_accessors<T: 'static, F: Clone + 'static>(
        get: fn(&T) -> &F,
        set: fn(&mut T, F),
    ) -> FieldAccessors {
        FieldAccessors {
            get: Box::new(move |obj: &dyn Any| {
                obj.downcast_ref::<T>()
                    .map(|t| Box::new(get(t).clone()) as Box<dyn Any>)
            }),
            set: Box::new(move |obj: &mut dyn Any, value: Box<dyn Any>| {
                let Some(t) = obj.downcast_mut::<T>() else {
                    return false;
                };
                match value.downcast::<F>() {
                    Ok(v) => {
                        set(t, *v);
                        true
                    }
                    Err(_) => false,
                }
            }),
        }
    }

    /// Declares the identifier field.
    ///
    /// The getter returns `None` while the identifier is unset; the setter
    /// installs a generated identifier. The stored name is always `_id`.
    #[must_use]
    pub fn id<T: 'static>(
        name: &'static str,
        get: fn(&T) -> Option<EntityId>,
        set: fn(&mut T, EntityId),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<EntityId>());
        spec.is_id = true;
        spec.id_accessors = Some(IdAccessors {
            get: Box::new(move |obj: &dyn Any| obj.downcast_ref::<T>().and_then(|t| get(t))),
            set: Box::new(move |obj: &mut dyn Any, id: EntityId| {
                match obj.downcast_mut::<T>() {
                    Some(t) => {
                        set(t, id);
                        true
                    }
                    None => false,
                }
            }),
        });
        spec
    }

    /// Declares a field converted by a codec from the type-codec registry.
    ///
    /// The codec is looked up by the field's full generic type signature
    /// during specialization.
    #[must_use]
    pub fn scalar<T: 'static, F: Clone + 'static>(
        name: &'static str,
        get: fn(&T) -> &F,
        set: fn(&mut T, F),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<F>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec
    }

    /// Declares a string-keyed map field converted by a codec from the
    /// type-codec registry.
    ///
    /// Maps are declared explicitly because their keys are opaque to path
    /// resolution: a dotted path continuing past a map field passes
    /// through untranslated.
    #[must_use]
    pub fn string_map<T: 'static, F: Clone + 'static>(
        name: &'static str,
        get: fn(&T) -> &HashMap<String, F>,
        set: fn(&mut T, HashMap<String, F>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<HashMap<String, F>>());
        spec.map_shaped = true;
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec
    }

    /// Declares the version field used for optimistic concurrency.
    ///
    /// Version fields must be `i64`; a fresh entity starts at `0`.
    #[must_use]
    pub fn version<T: 'static>(
        name: &'static str,
        get: fn(&T) -> &i64,
        set: fn(&mut T, i64),
    ) -> Self {
        let mut spec = Self::scalar(name, get, set);
        spec.is_version = true;
        spec
    }

    /// Declares a field holding one embedded mapped value.
    #[must_use]
    pub fn embedded<T: 'static, E: Mappable + Clone>(
        name: &'static str,
        get: fn(&T) -> &E,
        set: fn(&mut T, E),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<E>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.embedded = Some(EmbeddedSpec {
            target: TypeKey::of::<E>(),
            spec: E::entity_spec,
            wrap_codec: None,
        });
        spec
    }

    /// Declares a field holding a list of embedded mapped values.
    #[must_use]
    pub fn embedded_list<T: 'static, E: Mappable + Clone>(
        name: &'static str,
        get: fn(&T) -> &Vec<E>,
        set: fn(&mut T, Vec<E>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<Vec<E>>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.embedded = Some(EmbeddedSpec {
            target: TypeKey::of::<E>(),
            spec: E::entity_spec,
            wrap_codec: Some(crate::codec::list_of::<E>),
        });
        spec
    }

    /// Declares a field whose declared type is an abstract or interface
    /// type and whose concrete value is chosen by discriminator at decode.
    ///
    /// The accessors bridge the field's in-memory representation (usually
    /// an enum) to and from the boxed concrete value: `get` yields the
    /// concrete value, `set` receives the decoded concrete value and
    /// returns `false` if it cannot accept it.
    #[must_use]
    pub fn polymorphic<T: 'static>(
        name: &'static str,
        target: SpecLink,
        get: fn(&T) -> Box<dyn Any>,
        set: fn(&mut T, Box<dyn Any>) -> bool,
    ) -> Self {
        let mut spec = Self::base(name, target.key);
        spec.element = Some(target.key);
        spec.accessors = Some(FieldAccessors {
            get: Box::new(move |obj: &dyn Any| obj.downcast_ref::<T>().map(|t| get(t))),
            set: Box::new(move |obj: &mut dyn Any, value: Box<dyn Any>| {
                match obj.downcast_mut::<T>() {
                    Some(t) => set(t, value),
                    None => false,
                }
            }),
        });
        spec.embedded = Some(EmbeddedSpec {
            target: target.key,
            spec: target.spec,
            wrap_codec: None,
        });
        spec
    }

    /// Declares a single-entity reference field.
    #[must_use]
    pub fn single_ref<T: 'static, E: Mappable>(
        name: &'static str,
        get: fn(&T) -> &SingleRef<E>,
        set: fn(&mut T, SingleRef<E>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<SingleRef<E>>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.reference = Some(Self::reference_spec::<E>(
            RefShape::Single,
            wrap_single::<E>,
            unerase_single::<E>,
        ));
        spec
    }

    /// Declares a list-of-entities reference field.
    #[must_use]
    pub fn list_ref<T: 'static, E: Mappable + Clone>(
        name: &'static str,
        get: fn(&T) -> &ListRef<E>,
        set: fn(&mut T, ListRef<E>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<ListRef<E>>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.reference = Some(Self::reference_spec::<E>(
            RefShape::List,
            wrap_list::<E>,
            unerase_list::<E>,
        ));
        spec
    }

    /// Declares a set-of-entities reference field.
    #[must_use]
    pub fn set_ref<T: 'static, E: Mappable + Clone>(
        name: &'static str,
        get: fn(&T) -> &SetRef<E>,
        set: fn(&mut T, SetRef<E>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<SetRef<E>>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.reference = Some(Self::reference_spec::<E>(
            RefShape::Set,
            wrap_set::<E>,
            unerase_set::<E>,
        ));
        spec
    }

    /// Declares a map-of-entities reference field with string keys.
    #[must_use]
    pub fn map_ref<T: 'static, E: Mappable + Clone>(
        name: &'static str,
        get: fn(&T) -> &MapRef<E>,
        set: fn(&mut T, MapRef<E>),
    ) -> Self {
        let mut spec = Self::base(name, TypeKey::of::<MapRef<E>>());
        spec.element = Some(TypeKey::of::<E>());
        spec.accessors = Some(Self::cloning_accessors(get, set));
        spec.reference = Some(Self::reference_spec::<E>(
            RefShape::Map,
            wrap_map::<E>,
            unerase_map::<E>,
        ));
        spec
    }

    fn reference_spec<E: Mappable>(
        shape: RefShape,
        wrap: fn(RefSeed) -> CoreResult<Box<dyn Any>>,
        as_reference: fn(&dyn Any) -> Option<&dyn AnyReference>,
    ) -> ReferenceSpec {
        ReferenceSpec {
            shape,
            target: TypeKey::of::<E>(),
            spec: E::entity_spec,
            lazy: false,
            ignore_missing: false,
            wrap,
            as_reference,
        }
    }

    /// Overrides the stored name.
    #[must_use]
    pub fn stored_as(mut self, name: &'static str) -> Self {
        self.stored_name = Some(name);
        self
    }

    /// Adds legacy stored names this field may also be loaded from.
    #[must_use]
    pub fn also_load(mut self, names: &[&'static str]) -> Self {
        self.aliases.extend_from_slice(names);
        self
    }

    /// Excludes the field from persistence.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Defers reference resolution until first access.
    ///
    /// Only meaningful on reference fields; the default resolves eagerly
    /// at decode time.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        if let Some(reference) = self.reference.as_mut() {
            reference.lazy = true;
        }
        self
    }

    /// Tolerates references whose target no longer exists.
    #[must_use]
    pub fn ignore_missing(mut self) -> Self {
        if let Some(reference) = self.reference.as_mut() {
            reference.ignore_missing = true;
        }
        self
    }
}

/// Declarative description of one mapped type.
pub struct EntitySpec {
    pub(crate) key: TypeKey,
    pub(crate) kind: EntityKind,
    pub(crate) is_abstract: bool,
    pub(crate) name: &'static str,
    pub(crate) collection: Option<&'static str>,
    pub(crate) discriminator: Option<&'static str>,
    pub(crate) extends: Option<SpecLink>,
    pub(crate) implements: Vec<SpecLink>,
    pub(crate) creator: Option<CreatorSpec>,
    pub(crate) lifecycle: Vec<(LifecycleEvent, LifecycleCallback)>,
    pub(crate) fields: Vec<FieldSpec>,
}

impl EntitySpec {
    fn base<T: 'static>(name: &'static str, kind: EntityKind, creator: Option<CreatorSpec>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            kind,
            is_abstract: false,
            name,
            collection: None,
            discriminator: None,
            extends: None,
            implements: Vec::new(),
            creator,
            lifecycle: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Declares a concrete entity type constructed by default + injection.
    #[must_use]
    pub fn entity<T: Default + 'static>(name: &'static str) -> Self {
        Self::base::<T>(name, EntityKind::Entity, Some(CreatorSpec::default_for::<T>()))
    }

    /// Declares a concrete entity type with an explicit creator.
    #[must_use]
    pub fn entity_using<T: 'static>(name: &'static str, creator: CreatorSpec) -> Self {
        Self::base::<T>(name, EntityKind::Entity, Some(creator))
    }

    /// Declares an abstract entity type.
    ///
    /// Abstract types may be mapped (for shared field declarations and
    /// discriminator participation) but can never be instantiated.
    #[must_use]
    pub fn abstract_entity<T: 'static>(name: &'static str) -> Self {
        let mut spec = Self::base::<T>(name, EntityKind::Entity, None);
        spec.is_abstract = true;
        spec
    }

    /// Declares an embedded type constructed by default + injection.
    #[must_use]
    pub fn embedded<T: Default + 'static>(name: &'static str) -> Self {
        Self::base::<T>(
            name,
            EntityKind::Embedded,
            Some(CreatorSpec::default_for::<T>()),
        )
    }

    /// Declares an embedded type with an explicit creator.
    #[must_use]
    pub fn embedded_using<T: 'static>(name: &'static str, creator: CreatorSpec) -> Self {
        Self::base::<T>(name, EntityKind::Embedded, Some(creator))
    }

    /// Declares an interface marker type.
    #[must_use]
    pub fn interface<T: 'static>(name: &'static str) -> Self {
        Self::base::<T>(name, EntityKind::Interface, None)
    }

    /// Overrides the collection name.
    #[must_use]
    pub fn collection(mut self, name: &'static str) -> Self {
        self.collection = Some(name);
        self
    }

    /// Overrides the discriminator value (default: the entity name).
    #[must_use]
    pub fn discriminator(mut self, value: &'static str) -> Self {
        self.discriminator = Some(value);
        self
    }

    /// Links this type to its direct supertype.
    #[must_use]
    pub fn extends(mut self, link: SpecLink) -> Self {
        self.extends = Some(link);
        self
    }

    /// Links this type to an interface it implements.
    #[must_use]
    pub fn implements(mut self, link: SpecLink) -> Self {
        self.implements.push(link);
        self
    }

    /// Adds a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Registers a pre-persist callback.
    #[must_use]
    pub fn on_pre_persist<T: 'static>(mut self, callback: fn(&mut T)) -> Self {
        self.lifecycle.push((
            LifecycleEvent::PrePersist,
            Self::entity_callback(callback),
        ));
        self
    }

    /// Registers a post-persist callback.
    #[must_use]
    pub fn on_post_persist<T: 'static>(mut self, callback: fn(&mut T)) -> Self {
        self.lifecycle.push((
            LifecycleEvent::PostPersist,
            Self::entity_callback(callback),
        ));
        self
    }

    /// Registers a pre-load callback receiving the raw document.
    #[must_use]
    pub fn on_pre_load(mut self, callback: fn(&mut Document)) -> Self {
        self.lifecycle.push((
            LifecycleEvent::PreLoad,
            LifecycleCallback::Document(Box::new(move |doc| callback(doc))),
        ));
        self
    }

    /// Registers a post-load callback.
    #[must_use]
    pub fn on_post_load<T: 'static>(mut self, callback: fn(&mut T)) -> Self {
        self.lifecycle
            .push((LifecycleEvent::PostLoad, Self::entity_callback(callback)));
        self
    }

    fn entity_callback<T: 'static>(callback: fn(&mut T)) -> LifecycleCallback {
        LifecycleCallback::Entity(Box::new(move |obj: &mut dyn Any| {
            if let Some(t) = obj.downcast_mut::<T>() {
                callback(t);
            }
        }))
    }
}
