//! The type registry.

use crate::codec::{DefaultCodecRegistry, EntityCodec, TypeCodecRegistry};
use crate::entity_model::EntityModel;
use crate::error::CoreResult;
use crate::error::MappingError;
use crate::mapped_class::MappedClass;
use crate::options::MapperOptions;
use crate::spec::{EntitySpec, Mappable};
use crate::validation::MappingValidator;
use parking_lot::{ReentrantMutex, RwLock};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide cache from runtime type to mapped metadata.
///
/// The mapper is an explicit, constructed object (no ambient singletons)
/// handed to every component that needs metadata. Mapping a type builds
/// its model, wraps it, runs the validator chain, registers a generated
/// codec, and caches the result; mapping the same type again returns the
/// cached metadata unchanged.
///
/// # Concurrency
///
/// Reads of already-published entries are lock-free readers of an
/// `RwLock`-guarded map. Discovery of a not-yet-cached type runs in a
/// single exclusive critical section (a reentrant lock, so recursive
/// mapping of cross-referencing types on one thread cannot deadlock), and
/// a type is published only after its metadata is complete; readers never
/// observe a partially-built entry. A type that fails validation or codec
/// generation is rolled back entirely.
pub struct Mapper {
    options: MapperOptions,
    codec_registry: Arc<dyn TypeCodecRegistry>,
    validator: MappingValidator,
    map_lock: ReentrantMutex<()>,
    state: RwLock<MapperState>,
}

#[derive(Default)]
struct MapperState {
    by_type: HashMap<TypeId, Arc<MappedClass>>,
    codecs: HashMap<TypeId, Arc<EntityCodec>>,
    by_collection: HashMap<String, TypeId>,
    by_discriminator: HashMap<String, TypeId>,
    /// Declared ancestors (supertype + interfaces) per mapped type.
    parents: HashMap<TypeId, Vec<TypeId>>,
    /// Ancestor to mapped subtypes.
    children: HashMap<TypeId, Vec<TypeId>>,
    /// Not-yet-mapped ancestor to subtypes waiting to be linked.
    pending_links: HashMap<TypeId, Vec<TypeId>>,
}

impl Mapper {
    /// Creates a mapper with the standard type-codec registry.
    #[must_use]
    pub fn new(options: MapperOptions) -> Self {
        Self::with_codec_registry(options, Arc::new(DefaultCodecRegistry::standard()))
    }

    /// Creates a mapper with a caller-supplied type-codec registry.
    #[must_use]
    pub fn with_codec_registry(
        options: MapperOptions,
        codec_registry: Arc<dyn TypeCodecRegistry>,
    ) -> Self {
        Self {
            options,
            codec_registry,
            validator: MappingValidator::new(),
            map_lock: ReentrantMutex::new(()),
            state: RwLock::new(MapperState::default()),
        }
    }

    /// The mapper's options.
    #[must_use]
    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// The type-codec registry collaborator.
    #[must_use]
    pub fn codec_registry(&self) -> &Arc<dyn TypeCodecRegistry> {
        &self.codec_registry
    }

    /// True: implementing [`Mappable`] is the entity/embeddable marker,
    /// independent of whether the type has been mapped yet.
    #[must_use]
    pub fn is_mappable<T: Mappable>() -> bool {
        true
    }

    /// True if the type has already been mapped in this registry.
    #[must_use]
    pub fn is_mapped<T: 'static>(&self) -> bool {
        self.state.read().by_type.contains_key(&TypeId::of::<T>())
    }

    /// Maps a type, or returns its cached metadata.
    ///
    /// # Errors
    ///
    /// Fails with a mapping or validation error; a failed type is not left
    /// partially registered.
    pub fn map<T: Mappable>(&self) -> CoreResult<Arc<MappedClass>> {
        if let Some(existing) = self.class_by_type(TypeId::of::<T>()) {
            return Ok(existing);
        }
        self.map_spec(T::entity_spec())
    }

    /// Maps several types, returning metadata in input order (including
    /// already-cached entries).
    ///
    /// # Errors
    ///
    /// Fails on the first type that cannot be mapped; earlier types stay
    /// registered.
    pub fn map_all(&self, specs: &[fn() -> EntitySpec]) -> CoreResult<Vec<Arc<MappedClass>>> {
        specs.iter().map(|spec| self.map_spec(spec())).collect()
    }

    /// Maps a type from its declarative spec, or returns cached metadata.
    ///
    /// # Errors
    ///
    /// Fails with a mapping or validation error; a failed type is not left
    /// partially registered.
    pub fn map_spec(&self, spec: EntitySpec) -> CoreResult<Arc<MappedClass>> {
        let type_id = spec.key.type_id();
        if let Some(existing) = self.class_by_type(type_id) {
            return Ok(existing);
        }

        let _guard = self.map_lock.lock();
        // Another thread may have finished this type while we waited.
        if let Some(existing) = self.class_by_type(type_id) {
            return Ok(existing);
        }

        let model = EntityModel::build(spec, &self.options)?;
        let mapped = Arc::new(MappedClass::new(model)?);
        self.validator.validate(&mapped)?;

        let codec = Arc::new(EntityCodec::new(Arc::clone(&mapped)));
        let drained = self.publish(&mapped, &codec);

        // Specialization may recursively map embedded and referenced
        // types; the reentrant lock keeps that on this thread.
        if let Err(error) = codec.specialize(self) {
            self.rollback(&mapped, drained);
            return Err(error);
        }

        debug!(entity = mapped.name(), "mapped type");
        Ok(mapped)
    }

    /// Pure cache lookup; never maps as a side effect.
    #[must_use]
    pub fn get_mapped_class<T: 'static>(&self) -> Option<Arc<MappedClass>> {
        self.class_by_type(TypeId::of::<T>())
    }

    /// Cache lookup by type identity.
    #[must_use]
    pub fn class_by_type(&self, type_id: TypeId) -> Option<Arc<MappedClass>> {
        self.state.read().by_type.get(&type_id).cloned()
    }

    /// The generated codec for a mapped type.
    #[must_use]
    pub fn codec_by_type(&self, type_id: TypeId) -> Option<Arc<EntityCodec>> {
        self.state.read().codecs.get(&type_id).cloned()
    }

    /// Reverse lookup from a collection name to its mapped type.
    ///
    /// # Errors
    ///
    /// Fails if the collection name was never associated with a mapped
    /// type.
    pub fn class_from_collection(&self, collection: &str) -> CoreResult<Arc<MappedClass>> {
        let state = self.state.read();
        state
            .by_collection
            .get(collection)
            .and_then(|type_id| state.by_type.get(type_id))
            .cloned()
            .ok_or_else(|| MappingError::unknown_collection(collection).into())
    }

    /// The mapped type registered for a discriminator value.
    #[must_use]
    pub fn type_for_discriminator(&self, value: &str) -> Option<TypeId> {
        self.state.read().by_discriminator.get(value).copied()
    }

    /// The direct mapped subtypes of a type.
    #[must_use]
    pub fn subtypes_of(&self, type_id: TypeId) -> Vec<Arc<MappedClass>> {
        let state = self.state.read();
        state
            .children
            .get(&type_id)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child| state.by_type.get(child))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The mapped superclass of a type, if its declared parent is mapped.
    #[must_use]
    pub fn superclass_of(&self, type_id: TypeId) -> Option<Arc<MappedClass>> {
        let parent = self
            .class_by_type(type_id)?
            .model()
            .extends()?
            .type_id();
        self.class_by_type(parent)
    }

    /// True if any mapped subtype links to the type.
    #[must_use]
    pub fn has_subtypes(&self, type_id: TypeId) -> bool {
        self.state
            .read()
            .children
            .get(&type_id)
            .is_some_and(|children| !children.is_empty())
    }

    /// True if the type participates in polymorphic decode and must carry
    /// a discriminator.
    #[must_use]
    pub fn is_polymorphic(&self, mapped: &MappedClass) -> bool {
        mapped.is_abstract()
            || mapped.is_interface()
            || mapped.model().extends().is_some()
            || !mapped.model().implements().is_empty()
            || self.has_subtypes(mapped.type_key().type_id())
    }

    /// Publishes a fully-built type and links it into the subtype graph.
    ///
    /// Returns the children that had been waiting for this type, so a
    /// later rollback can restore them to the pending table.
    fn publish(&self, mapped: &Arc<MappedClass>, codec: &Arc<EntityCodec>) -> Vec<TypeId> {
        let type_id = mapped.type_key().type_id();
        let mut state = self.state.write();

        state.by_type.insert(type_id, Arc::clone(mapped));
        state.codecs.insert(type_id, Arc::clone(codec));
        if let Some(collection) = mapped.collection() {
            // One representative type per collection: first mapped wins.
            state
                .by_collection
                .entry(collection.to_string())
                .or_insert(type_id);
        }
        state
            .by_discriminator
            .insert(mapped.discriminator().to_string(), type_id);

        let mut ancestors = Vec::new();
        if let Some(parent) = mapped.model().extends() {
            ancestors.push(parent.type_id());
        }
        ancestors.extend(mapped.model().implements().iter().map(|k| k.type_id()));

        for ancestor in &ancestors {
            if state.by_type.contains_key(ancestor) {
                link(&mut state.children, *ancestor, type_id);
            } else {
                // Parent not mapped yet: the link lands when it arrives.
                link(&mut state.pending_links, *ancestor, type_id);
            }
        }
        state.parents.insert(type_id, ancestors);

        let drained = state.pending_links.remove(&type_id).unwrap_or_default();
        for child in &drained {
            link(&mut state.children, type_id, *child);
        }
        drained
    }

    /// Removes every trace of a type whose codec generation failed.
    fn rollback(&self, mapped: &Arc<MappedClass>, drained: Vec<TypeId>) {
        let type_id = mapped.type_key().type_id();
        let mut state = self.state.write();

        state.by_type.remove(&type_id);
        state.codecs.remove(&type_id);
        if let Some(collection) = mapped.collection() {
            if state.by_collection.get(collection) == Some(&type_id) {
                state.by_collection.remove(collection);
            }
        }
        if state.by_discriminator.get(mapped.discriminator()) == Some(&type_id) {
            state.by_discriminator.remove(mapped.discriminator());
        }

        if let Some(ancestors) = state.parents.remove(&type_id) {
            for ancestor in ancestors {
                if let Some(children) = state.children.get_mut(&ancestor) {
                    children.retain(|child| *child != type_id);
                }
                if let Some(pending) = state.pending_links.get_mut(&ancestor) {
                    pending.retain(|child| *child != type_id);
                }
            }
        }
        state.children.remove(&type_id);
        if !drained.is_empty() {
            state.pending_links.insert(type_id, drained);
        }
    }
}

/// Idempotent register-and-link: appends an edge unless already present.
fn link(graph: &mut HashMap<TypeId, Vec<TypeId>>, from: TypeId, to: TypeId) {
    let edges = graph.entry(from).or_default();
    if !edges.contains(&to) {
        edges.push(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::spec::{FieldSpec, SpecLink};
    use docmap_document::EntityId;

    #[derive(Default)]
    struct User {
        id: Option<EntityId>,
        name: String,
    }

    impl Mappable for User {
        fn entity_spec() -> EntitySpec {
            EntitySpec::entity::<User>("User")
                .field(FieldSpec::id(
                    "id",
                    |u: &User| u.id,
                    |u: &mut User, id| u.id = Some(id),
                ))
                .field(FieldSpec::scalar(
                    "name",
                    |u: &User| &u.name,
                    |u: &mut User, v| u.name = v,
                ))
        }
    }

    #[derive(Default)]
    struct Animal {
        id: Option<EntityId>,
    }

    impl Mappable for Animal {
        fn entity_spec() -> EntitySpec {
            EntitySpec::abstract_entity::<Animal>("Animal")
                .collection("animals")
                .field(FieldSpec::id(
                    "id",
                    |a: &Animal| a.id,
                    |a: &mut Animal, id| a.id = Some(id),
                ))
        }
    }

    #[derive(Default)]
    struct Dog {
        id: Option<EntityId>,
        name: String,
    }

    impl Mappable for Dog {
        fn entity_spec() -> EntitySpec {
            EntitySpec::entity::<Dog>("Dog")
                .collection("animals")
                .extends(SpecLink::to::<Animal>())
                .field(FieldSpec::id(
                    "id",
                    |d: &Dog| d.id,
                    |d: &mut Dog, id| d.id = Some(id),
                ))
                .field(FieldSpec::scalar(
                    "name",
                    |d: &Dog| &d.name,
                    |d: &mut Dog, v| d.name = v,
                ))
        }
    }

    #[test]
    fn mapping_is_idempotent() {
        let mapper = Mapper::new(MapperOptions::default());
        let first = mapper.map::<User>().unwrap();
        let second = mapper.map::<User>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_never_maps_as_side_effect() {
        let mapper = Mapper::new(MapperOptions::default());
        assert!(mapper.get_mapped_class::<User>().is_none());
        assert!(!mapper.is_mapped::<User>());

        mapper.map::<User>().unwrap();
        assert!(mapper.get_mapped_class::<User>().is_some());
        assert!(mapper.is_mapped::<User>());
    }

    #[test]
    fn collection_reverse_lookup() {
        let mapper = Mapper::new(MapperOptions::default());
        mapper.map::<User>().unwrap();

        let found = mapper.class_from_collection("User").unwrap();
        assert_eq!(found.name(), "User");

        let err = mapper.class_from_collection("nope").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Mapping(MappingError::UnknownCollection { .. })
        ));
    }

    #[test]
    fn subtype_links_survive_child_first_mapping() {
        let mapper = Mapper::new(MapperOptions::default());

        // Child before parent: the link is pending until Animal arrives.
        mapper.map::<Dog>().unwrap();
        assert!(mapper.subtypes_of(std::any::TypeId::of::<Animal>()).is_empty());

        mapper.map::<Animal>().unwrap();
        let subtypes = mapper.subtypes_of(std::any::TypeId::of::<Animal>());
        assert_eq!(subtypes.len(), 1);
        assert_eq!(subtypes[0].name(), "Dog");

        let superclass = mapper.superclass_of(std::any::TypeId::of::<Dog>()).unwrap();
        assert_eq!(superclass.name(), "Animal");
    }

    #[test]
    fn parent_first_mapping_links_directly() {
        let mapper = Mapper::new(MapperOptions::default());
        mapper.map::<Animal>().unwrap();
        mapper.map::<Dog>().unwrap();
        assert_eq!(mapper.subtypes_of(std::any::TypeId::of::<Animal>()).len(), 1);
    }

    #[test]
    fn missing_identifier_is_rejected() {
        #[derive(Default)]
        struct NoId {
            name: String,
        }

        let spec = EntitySpec::entity::<NoId>("NoId").field(FieldSpec::scalar(
            "name",
            |n: &NoId| &n.name,
            |n: &mut NoId, v| n.name = v,
        ));

        let mapper = Mapper::new(MapperOptions::default());
        let err = mapper.map_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Mapping(MappingError::MissingIdField { .. })
        ));
        assert!(!mapper.is_mapped::<NoId>());
    }

    #[test]
    fn identifier_on_embedded_is_rejected() {
        #[derive(Default, Clone)]
        struct Part {
            id: Option<EntityId>,
        }

        let spec = EntitySpec::embedded::<Part>("Part").field(FieldSpec::id(
            "id",
            |p: &Part| p.id,
            |p: &mut Part, id| p.id = Some(id),
        ));

        let mapper = Mapper::new(MapperOptions::default());
        let err = mapper.map_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Mapping(MappingError::IdOnNonEntity { .. })
        ));
    }

    #[test]
    fn failed_codec_generation_rolls_back() {
        #[derive(Clone)]
        struct Opaque;

        #[derive(Default)]
        struct Holder {
            id: Option<EntityId>,
            raw: Vec<Opaque>,
        }

        // Vec<Opaque> has no registered codec and is not a mapped type.
        let spec = EntitySpec::entity::<Holder>("Holder")
            .field(FieldSpec::id(
                "id",
                |h: &Holder| h.id,
                |h: &mut Holder, id| h.id = Some(id),
            ))
            .field(FieldSpec::scalar(
                "raw",
                |h: &Holder| &h.raw,
                |h: &mut Holder, v| h.raw = v,
            ));

        let mapper = Mapper::new(MapperOptions::default());
        let err = mapper.map_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Mapping(MappingError::NoCodecForType { .. })
        ));
        assert!(!mapper.is_mapped::<Holder>());
        assert!(mapper.class_from_collection("Holder").is_err());
    }

    #[test]
    fn map_all_returns_input_order() {
        let mapper = Mapper::new(MapperOptions::default());
        let mapped = mapper
            .map_all(&[Dog::entity_spec, Animal::entity_spec, Dog::entity_spec])
            .unwrap();
        let names: Vec<&str> = mapped.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Dog", "Animal", "Dog"]);
    }

    #[test]
    fn concurrent_mapping_registers_once() {
        let mapper = Arc::new(Mapper::new(MapperOptions::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mapper = Arc::clone(&mapper);
                std::thread::spawn(move || mapper.map::<User>().unwrap())
            })
            .collect();

        let mapped: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &mapped[1..] {
            assert!(Arc::ptr_eq(&mapped[0], other));
        }
    }
}
