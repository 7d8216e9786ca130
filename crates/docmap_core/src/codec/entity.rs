//! The generated per-entity codec.

use crate::codec::{DecodeContext, EncodeContext, ValueCodec};
use crate::error::{CoreResult, MappingError};
use crate::mapped_class::MappedClass;
use crate::mapper::Mapper;
use crate::refs::ReferenceCodec;
use crate::spec::{ArgBag, CreatorSpec};
use crate::type_key::TypeKey;
use docmap_document::{Document, EntityId, Value};
use std::any::Any;
use std::sync::Arc;

/// The codec generated for one mapped type.
///
/// Produced when the type is registered; field codecs are specialized once,
/// eagerly, immediately afterwards, and cached on each field model for the
/// life of the registry.
pub struct EntityCodec {
    mapped: Arc<MappedClass>,
}

impl EntityCodec {
    pub(crate) fn new(mapped: Arc<MappedClass>) -> Self {
        Self { mapped }
    }

    /// The mapped class backing this codec.
    #[must_use]
    pub fn mapped_class(&self) -> &Arc<MappedClass> {
        &self.mapped
    }

    /// Pairs every field with its concrete codec.
    ///
    /// Reference fields get a reference codec; other fields consult the
    /// type-codec registry by full type signature, falling back to the
    /// generated codec of an embedded mapped type. A field that matches
    /// none of these fails codec generation.
    pub(crate) fn specialize(&self, mapper: &Mapper) -> CoreResult<()> {
        for field in self.mapped.fields() {
            if field.is_id() {
                continue;
            }

            let codec: Arc<dyn ValueCodec> = if let Some(reference) = field.reference() {
                mapper.map_spec((reference.spec)())?;
                Arc::new(ReferenceCodec::new(*reference))
            } else if let Some(registered) = mapper.codec_registry().lookup(field.type_key()) {
                registered
            } else if let Some(embedded) = field.embedded() {
                mapper.map_spec((embedded.spec)())?;
                let inner: Arc<dyn ValueCodec> = Arc::new(EmbeddedCodec::new(embedded.target));
                match embedded.wrap_codec {
                    Some(wrap) => wrap(inner),
                    None => inner,
                }
            } else {
                return Err(
                    MappingError::no_codec(field.full_name(), field.type_key().name()).into(),
                );
            };
            field.cache_codec(codec);
        }
        Ok(())
    }

    /// Encodes an instance to a document, fields in declaration order.
    pub fn encode(&self, entity: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Document> {
        let mapper = ctx.datastore().mapper();
        let polymorphic = mapper.is_polymorphic(&self.mapped);
        let mut document = Document::new();

        // Types without an identifier (embedded) carry their discriminator
        // up front; entities carry it right after the identifier entry.
        let mut discriminator_pending = polymorphic;
        if discriminator_pending && self.mapped.id_field().is_none() {
            self.write_discriminator(&mut document);
            discriminator_pending = false;
        }

        for field in self.mapped.fields() {
            if field.is_id() {
                if let Some(id) = field.id_value(entity) {
                    document.insert(field.stored_name(), Value::Id(id));
                }
                if discriminator_pending {
                    self.write_discriminator(&mut document);
                    discriminator_pending = false;
                }
                continue;
            }

            let value = field.get_value(entity)?;
            let codec = field.cached_codec().ok_or_else(|| {
                MappingError::no_codec(field.full_name(), field.type_key().name())
            })?;
            document.insert(field.stored_name(), codec.encode(&*value, ctx)?);
        }

        Ok(document)
    }

    fn write_discriminator(&self, document: &mut Document) {
        document.insert(
            self.mapped.discriminator_key(),
            Value::from(self.mapped.discriminator()),
        );
    }

    /// Decodes a document into an instance.
    ///
    /// Consults the discriminator first: a value naming another registered
    /// type delegates to that type's codec; an unregistered value is an
    /// error.
    pub fn decode(&self, document: &Document, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        if let Some(value) = document
            .get(self.mapped.discriminator_key())
            .and_then(Value::as_text)
        {
            if value != self.mapped.discriminator() {
                let mapper = ctx.datastore().mapper();
                let target = mapper
                    .type_for_discriminator(value)
                    .ok_or_else(|| MappingError::unknown_discriminator(value))?;
                let codec = mapper
                    .codec_by_type(target)
                    .ok_or_else(|| MappingError::unknown_discriminator(value))?;
                return codec.decode_own(document, ctx);
            }
        }
        self.decode_own(document, ctx)
    }

    /// Decodes a document as this codec's own type, without discriminator
    /// dispatch.
    fn decode_own(&self, document: &Document, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        match self.mapped.model().creator() {
            None => Err(MappingError::not_instantiable(self.mapped.name()).into()),
            Some(CreatorSpec::Default(make)) => {
                let mut instance = make();
                for field in self.mapped.fields() {
                    if field.is_id() {
                        if let Some(id) =
                            document.get(field.stored_name()).and_then(Value::as_id)
                        {
                            field.set_id(&mut *instance, id)?;
                        }
                        continue;
                    }
                    let Some(value) = field.document_value(document)? else {
                        continue;
                    };
                    let codec = field.cached_codec().ok_or_else(|| {
                        MappingError::no_codec(field.full_name(), field.type_key().name())
                    })?;
                    let decoded = codec.decode(value, ctx)?;
                    field.set_value(&mut *instance, decoded)?;
                }
                Ok(instance)
            }
            Some(CreatorSpec::Constructor { build, .. }) => {
                let mut bag = ArgBag::new();
                for field in self.mapped.fields() {
                    if field.is_id() {
                        let id = document.get(field.stored_name()).and_then(Value::as_id);
                        bag.put(field.name(), Box::new(id));
                        continue;
                    }
                    let value = field.document_value(document)?;
                    let codec = field.cached_codec().ok_or_else(|| {
                        MappingError::no_codec(field.full_name(), field.type_key().name())
                    })?;
                    let decoded = codec.decode(value.unwrap_or(&Value::Null), ctx)?;
                    bag.put(field.name(), decoded);
                }
                build(&mut bag)
            }
        }
    }

    /// Returns the instance's identifier, generating and installing one if
    /// it is unset. The second element is `true` when a fresh identifier
    /// was generated, an observable mutation of the instance.
    pub fn ensure_id(&self, entity: &mut dyn Any) -> CoreResult<(EntityId, bool)> {
        let id_field = self
            .mapped
            .id_field()
            .ok_or_else(|| MappingError::missing_id_field(self.mapped.name()))?;
        match id_field.id_value(entity) {
            Some(id) => Ok((id, false)),
            None => {
                let id = EntityId::new();
                id_field.set_id(entity, id)?;
                Ok((id, true))
            }
        }
    }

    /// True if the instance's identifier is set.
    #[must_use]
    pub fn has_id(&self, entity: &dyn Any) -> bool {
        self.mapped
            .id_field()
            .and_then(|f| f.id_value(entity))
            .is_some()
    }
}

/// Codec for fields whose element type is itself mapped.
///
/// Encoding dispatches on the value's runtime type so a field declared as
/// an abstract or interface type encodes the concrete subtype (with its
/// discriminator); decoding starts at the declared target, which redirects
/// by discriminator as needed.
pub(crate) struct EmbeddedCodec {
    target: TypeKey,
}

impl EmbeddedCodec {
    pub(crate) fn new(target: TypeKey) -> Self {
        Self { target }
    }
}

impl ValueCodec for EmbeddedCodec {
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let mapper = ctx.datastore().mapper();
        let codec = mapper
            .codec_by_type(value.type_id())
            .ok_or_else(|| MappingError::not_mapped(self.target.name()))?;
        Ok(Value::Document(codec.encode(value, ctx)?))
    }

    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        let document = value.as_document().ok_or_else(|| {
            MappingError::invalid_value(self.target.name(), "document", value.type_name())
        })?;
        let mapper = ctx.datastore().mapper();
        let codec = mapper
            .codec_by_type(self.target.type_id())
            .ok_or_else(|| MappingError::not_mapped(self.target.name()))?;
        codec.decode(document, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Datastore;
    use crate::options::MapperOptions;
    use crate::spec::{EntitySpec, FieldSpec, Mappable, SpecLink};
    use docmap_store::MemoryStore;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Address {
        street: String,
        city: String,
    }

    impl Mappable for Address {
        fn entity_spec() -> EntitySpec {
            EntitySpec::embedded::<Address>("Address")
                .field(FieldSpec::scalar(
                    "street",
                    |a: &Address| &a.street,
                    |a: &mut Address, v| a.street = v,
                ))
                .field(FieldSpec::scalar(
                    "city",
                    |a: &Address| &a.city,
                    |a: &mut Address, v| a.city = v,
                ))
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Person {
        id: Option<EntityId>,
        name: String,
        nicknames: Vec<String>,
        home: Address,
    }

    impl Mappable for Person {
        fn entity_spec() -> EntitySpec {
            EntitySpec::entity::<Person>("Person")
                .field(FieldSpec::id(
                    "id",
                    |p: &Person| p.id,
                    |p: &mut Person, id| p.id = Some(id),
                ))
                .field(FieldSpec::scalar(
                    "name",
                    |p: &Person| &p.name,
                    |p: &mut Person, v| p.name = v,
                ))
                .field(FieldSpec::scalar(
                    "nicknames",
                    |p: &Person| &p.nicknames,
                    |p: &mut Person, v| p.nicknames = v,
                ))
                .field(FieldSpec::embedded(
                    "home",
                    |p: &Person| &p.home,
                    |p: &mut Person, v| p.home = v,
                ))
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Renamed {
        id: Option<EntityId>,
        full_name: String,
    }

    impl Mappable for Renamed {
        fn entity_spec() -> EntitySpec {
            EntitySpec::entity::<Renamed>("Renamed")
                .field(FieldSpec::id(
                    "id",
                    |r: &Renamed| r.id,
                    |r: &mut Renamed, id| r.id = Some(id),
                ))
                .field(
                    FieldSpec::scalar(
                        "full_name",
                        |r: &Renamed| &r.full_name,
                        |r: &mut Renamed, v| r.full_name = v,
                    )
                    .stored_as("name")
                    .also_load(&["nm"]),
                )
        }
    }

    fn datastore() -> Datastore {
        Datastore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Mapper::new(MapperOptions::default())),
        )
    }

    fn codec_for<T: Mappable>(datastore: &Datastore) -> Arc<EntityCodec> {
        let mapped = datastore.mapper().map::<T>().unwrap();
        datastore
            .mapper()
            .codec_by_type(mapped.type_key().type_id())
            .unwrap()
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let datastore = datastore();
        let codec = codec_for::<Person>(&datastore);

        let person = Person {
            id: Some(EntityId::new()),
            name: "Alice".to_string(),
            nicknames: vec!["Al".to_string(), "Ace".to_string()],
            home: Address {
                street: "1 Main St".to_string(),
                city: "Springfield".to_string(),
            },
        };

        let document = codec
            .encode(&person, &EncodeContext::new(&datastore))
            .unwrap();
        let decoded = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap();
        let decoded = decoded.downcast::<Person>().unwrap();
        assert_eq!(*decoded, person);
    }

    #[test]
    fn document_order_mirrors_declaration_order() {
        let datastore = datastore();
        let codec = codec_for::<Person>(&datastore);

        let person = Person {
            id: Some(EntityId::new()),
            name: "Alice".to_string(),
            ..Person::default()
        };
        let document = codec
            .encode(&person, &EncodeContext::new(&datastore))
            .unwrap();
        assert_eq!(
            document.keys().collect::<Vec<_>>(),
            vec!["_id", "name", "nicknames", "home"]
        );
    }

    #[test]
    fn unset_identifier_is_omitted_from_encode() {
        let datastore = datastore();
        let codec = codec_for::<Person>(&datastore);

        let person = Person::default();
        let document = codec
            .encode(&person, &EncodeContext::new(&datastore))
            .unwrap();
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn ensure_id_generates_once() {
        let datastore = datastore();
        let codec = codec_for::<Person>(&datastore);

        let mut person = Person::default();
        assert!(!codec.has_id(&person));

        let (id, generated) = codec.ensure_id(&mut person).unwrap();
        assert!(generated);
        assert_eq!(person.id, Some(id));

        let (again, generated) = codec.ensure_id(&mut person).unwrap();
        assert!(!generated);
        assert_eq!(again, id);
    }

    #[test]
    fn alias_fallback_reads_legacy_name() {
        let datastore = datastore();
        let codec = codec_for::<Renamed>(&datastore);

        let mut document = Document::new();
        document.insert("_id", Value::Id(EntityId::new()));
        document.insert("nm", Value::from("legacy"));

        let decoded = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap();
        let decoded = decoded.downcast::<Renamed>().unwrap();
        assert_eq!(decoded.full_name, "legacy");
    }

    #[test]
    fn both_alias_and_current_name_is_ambiguous() {
        let datastore = datastore();
        let codec = codec_for::<Renamed>(&datastore);

        let mut document = Document::new();
        document.insert("_id", Value::Id(EntityId::new()));
        document.insert("name", Value::from("current"));
        document.insert("nm", Value::from("legacy"));

        let err = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Mapping(MappingError::AmbiguousStoredField { .. })
        ));
    }

    #[test]
    fn constructor_creator_builds_instances() {
        #[derive(Clone, Debug, PartialEq)]
        struct Point {
            id: Option<EntityId>,
            x: i64,
            y: i64,
        }

        impl Mappable for Point {
            fn entity_spec() -> EntitySpec {
                EntitySpec::entity_using::<Point>(
                    "Point",
                    crate::spec::CreatorSpec::constructor(
                        &["id", "x", "y"],
                        |args: &mut crate::spec::ArgBag| {
                            Ok(Box::new(Point {
                                id: args.take("id")?,
                                x: args.take("x")?,
                                y: args.take("y")?,
                            }) as Box<dyn Any>)
                        },
                    ),
                )
                .field(FieldSpec::id(
                    "id",
                    |p: &Point| p.id,
                    |p: &mut Point, id| p.id = Some(id),
                ))
                .field(FieldSpec::scalar("x", |p: &Point| &p.x, |p: &mut Point, v| p.x = v))
                .field(FieldSpec::scalar("y", |p: &Point| &p.y, |p: &mut Point, v| p.y = v))
            }
        }

        let datastore = datastore();
        let codec = codec_for::<Point>(&datastore);

        let point = Point {
            id: Some(EntityId::new()),
            x: 3,
            y: -4,
        };
        let document = codec
            .encode(&point, &EncodeContext::new(&datastore))
            .unwrap();
        let decoded = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap();
        assert_eq!(*decoded.downcast::<Point>().unwrap(), point);
    }

    #[test]
    fn polymorphic_types_carry_discriminators() {
        #[derive(Clone, Debug, Default, PartialEq)]
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

        #[derive(Clone, Debug, Default, PartialEq)]
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

        let datastore = datastore();
        datastore.mapper().map::<Animal>().unwrap();
        let codec = codec_for::<Dog>(&datastore);

        let dog = Dog {
            id: Some(EntityId::new()),
            name: "Rex".to_string(),
        };
        let document = codec.encode(&dog, &EncodeContext::new(&datastore)).unwrap();
        assert_eq!(document.get("_t"), Some(&Value::from("Dog")));

        // The parent's codec selects the concrete codec by discriminator.
        let animal_codec = codec_for::<Animal>(&datastore);
        let decoded = animal_codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap();
        assert_eq!(*decoded.downcast::<Dog>().unwrap(), dog);
    }

    #[test]
    fn unknown_discriminator_fails_decode() {
        #[derive(Clone, Debug, Default, PartialEq)]
        struct Plain {
            id: Option<EntityId>,
        }

        impl Mappable for Plain {
            fn entity_spec() -> EntitySpec {
                EntitySpec::entity::<Plain>("Plain").field(FieldSpec::id(
                    "id",
                    |p: &Plain| p.id,
                    |p: &mut Plain, id| p.id = Some(id),
                ))
            }
        }

        let datastore = datastore();
        let codec = codec_for::<Plain>(&datastore);

        let mut document = Document::new();
        document.insert("_id", Value::Id(EntityId::new()));
        document.insert("_t", Value::from("Vanished"));

        let err = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Mapping(MappingError::UnknownDiscriminator { .. })
        ));
    }

    #[test]
    fn abstract_types_cannot_be_instantiated() {
        #[derive(Clone, Debug, Default, PartialEq)]
        struct Base {
            id: Option<EntityId>,
        }

        impl Mappable for Base {
            fn entity_spec() -> EntitySpec {
                EntitySpec::abstract_entity::<Base>("Base").field(FieldSpec::id(
                    "id",
                    |b: &Base| b.id,
                    |b: &mut Base, id| b.id = Some(id),
                ))
            }
        }

        let datastore = datastore();
        let codec = codec_for::<Base>(&datastore);

        let mut document = Document::new();
        document.insert("_id", Value::Id(EntityId::new()));

        let err = codec
            .decode(&document, &DecodeContext::new(&datastore))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Mapping(MappingError::NotInstantiable { .. })
        ));
    }
}
