//! The standard constraint chain.

use crate::mapped_class::MappedClass;
use crate::spec::EntityKind;
use crate::validation::{ClassConstraint, ConstraintViolation, Level};

pub(crate) fn standard_constraints() -> Vec<Box<dyn ClassConstraint>> {
    vec![
        Box::new(MultipleIds),
        Box::new(MultipleVersions),
        Box::new(DuplicateStoredNames),
        Box::new(ReferenceToUnidentifiable),
        Box::new(LifecycleOnEmbedded),
    ]
}

/// At most one field may carry the identifier marker.
struct MultipleIds;

impl ClassConstraint for MultipleIds {
    fn name(&self) -> &'static str {
        "MultipleIds"
    }

    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>) {
        let ids: Vec<_> = mapped.fields().iter().filter(|f| f.is_id()).collect();
        if ids.len() > 1 {
            for field in &ids[1..] {
                violations.push(ConstraintViolation::on_field(
                    Level::Fatal,
                    mapped.name(),
                    field.name(),
                    self.name(),
                    "more than one field is marked as the identifier",
                ));
            }
        }
    }
}

/// At most one field may carry the version marker.
struct MultipleVersions;

impl ClassConstraint for MultipleVersions {
    fn name(&self) -> &'static str {
        "MultipleVersions"
    }

    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>) {
        let versions: Vec<_> = mapped.fields().iter().filter(|f| f.is_version()).collect();
        if versions.len() > 1 {
            for field in &versions[1..] {
                violations.push(ConstraintViolation::on_field(
                    Level::Fatal,
                    mapped.name(),
                    field.name(),
                    self.name(),
                    "only one version field is allowed",
                ));
            }
        }
    }
}

/// Stored names must be unique within a type's direct field list.
struct DuplicateStoredNames;

impl ClassConstraint for DuplicateStoredNames {
    fn name(&self) -> &'static str {
        "DuplicateStoredNames"
    }

    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>) {
        let fields = mapped.fields();
        for (i, field) in fields.iter().enumerate() {
            if fields[..i]
                .iter()
                .any(|other| other.stored_name() == field.stored_name())
            {
                violations.push(ConstraintViolation::on_field(
                    Level::Fatal,
                    mapped.name(),
                    field.name(),
                    self.name(),
                    format!("stored name {:?} is already in use", field.stored_name()),
                ));
            }
        }
    }
}

/// References must point at entity types; embedded types have no
/// identifier to reference.
struct ReferenceToUnidentifiable;

impl ClassConstraint for ReferenceToUnidentifiable {
    fn name(&self) -> &'static str {
        "ReferenceToUnidentifiable"
    }

    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>) {
        for field in mapped.fields() {
            let Some(reference) = field.reference() else {
                continue;
            };
            let target = (reference.spec)();
            if target.kind != EntityKind::Entity {
                violations.push(ConstraintViolation::on_field(
                    Level::Fatal,
                    mapped.name(),
                    field.name(),
                    self.name(),
                    format!("referenced type {} has no identifier", target.name),
                ));
            }
        }
    }
}

/// Lifecycle callbacks on embedded types never fire; they run only on
/// top-level loads and saves.
struct LifecycleOnEmbedded;

impl ClassConstraint for LifecycleOnEmbedded {
    fn name(&self) -> &'static str {
        "LifecycleOnEmbedded"
    }

    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>) {
        if mapped.is_embedded() && mapped.model().has_any_lifecycle() {
            violations.push(ConstraintViolation::new(
                Level::Warning,
                mapped.name(),
                self.name(),
                "lifecycle callbacks on embedded types never fire",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_model::EntityModel;
    use crate::options::MapperOptions;
    use crate::spec::{EntitySpec, FieldSpec};
    use crate::validation::MappingValidator;
    use docmap_document::EntityId;

    #[derive(Default)]
    struct Order {
        id: Option<EntityId>,
        version: i64,
        revision: i64,
        code: String,
    }

    fn mapped(spec: EntitySpec) -> MappedClass {
        let model = EntityModel::build(spec, &MapperOptions::default()).unwrap();
        MappedClass::new(model).unwrap()
    }

    fn base_spec() -> EntitySpec {
        EntitySpec::entity::<Order>("Order").field(FieldSpec::id(
            "id",
            |o: &Order| o.id,
            |o: &mut Order, id| o.id = Some(id),
        ))
    }

    #[test]
    fn single_version_field_passes() {
        let spec = base_spec().field(FieldSpec::version(
            "version",
            |o: &Order| &o.version,
            |o: &mut Order, v| o.version = v,
        ));
        assert!(MappingValidator::new().validate(&mapped(spec)).is_ok());
    }

    #[test]
    fn two_version_fields_are_fatal() {
        let spec = base_spec()
            .field(FieldSpec::version(
                "version",
                |o: &Order| &o.version,
                |o: &mut Order, v| o.version = v,
            ))
            .field(FieldSpec::version(
                "revision",
                |o: &Order| &o.revision,
                |o: &mut Order, v| o.revision = v,
            ));
        let failure = MappingValidator::new().validate(&mapped(spec)).unwrap_err();
        assert!(failure
            .violations()
            .iter()
            .any(|v| v.render().contains("MultipleVersions")));
    }

    #[test]
    fn duplicate_stored_names_are_fatal() {
        let spec = base_spec()
            .field(
                FieldSpec::scalar(
                    "code",
                    |o: &Order| &o.code,
                    |o: &mut Order, v| o.code = v,
                )
                .stored_as("c"),
            )
            .field(
                FieldSpec::scalar(
                    "version",
                    |o: &Order| &o.version,
                    |o: &mut Order, v| o.version = v,
                )
                .stored_as("c"),
            );
        let failure = MappingValidator::new().validate(&mapped(spec)).unwrap_err();
        assert!(failure
            .violations()
            .iter()
            .any(|v| v.render().contains("DuplicateStoredNames")));
    }

    #[test]
    fn warning_alone_does_not_block() {
        #[derive(Default, Clone)]
        struct Piece {
            note: String,
        }

        let spec = EntitySpec::embedded::<Piece>("Piece")
            .field(FieldSpec::scalar(
                "note",
                |p: &Piece| &p.note,
                |p: &mut Piece, v| p.note = v,
            ))
            .on_post_load::<Piece>(|_| {});
        assert!(MappingValidator::new().validate(&mapped(spec)).is_ok());
    }
}
