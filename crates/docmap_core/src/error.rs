//! Error types for DocMap core.

use crate::validation::ConstraintViolation;
use docmap_document::EntityId;
use docmap_store::StoreError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocMap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Type discovery or codec generation failed.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Structural validation of a mapped type failed.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// Reference resolution or reference encoding failed.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// The storage driver failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A versioned write matched nothing: someone else modified the document.
    #[error(
        "concurrent modification of {id} in collection {collection} (expected version {expected_version})"
    )]
    ConcurrentModification {
        /// Collection the write targeted.
        collection: String,
        /// Identifier of the contested document.
        id: EntityId,
        /// Version the write expected to find.
        expected_version: i64,
    },
}

impl CoreError {
    /// Creates a concurrent-modification error.
    pub fn concurrent_modification(
        collection: impl Into<String>,
        id: EntityId,
        expected_version: i64,
    ) -> Self {
        Self::ConcurrentModification {
            collection: collection.into(),
            id,
            expected_version,
        }
    }
}

/// Fatal errors raised during type discovery or codec generation.
///
/// These are never retried; they surface immediately to the caller of
/// `map` or of an encode/decode operation.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The type has not been mapped in this registry.
    #[error("type is not mapped: {type_name}")]
    NotMapped {
        /// Name of the unmapped type.
        type_name: String,
    },

    /// A concrete entity type declared no identifier field.
    #[error("missing identifier field on {type_name}")]
    MissingIdField {
        /// Name of the offending type.
        type_name: String,
    },

    /// An identifier marker appeared on an embeddable or interface type.
    #[error("identifier on non-entity type {type_name} (field {field})")]
    IdOnNonEntity {
        /// Name of the offending type.
        type_name: String,
        /// Name of the offending field.
        field: String,
    },

    /// More than one candidate stored name was present in a document.
    #[error("ambiguous stored field for {field}: document contains {names}")]
    AmbiguousStoredField {
        /// Qualified name of the logical field.
        field: String,
        /// The candidate names found simultaneously.
        names: String,
    },

    /// A constructor parameter matched no mapped field.
    #[error("constructor parameter {parameter} on {type_name} matches no mapped field")]
    UnmatchedConstructorParameter {
        /// Name of the offending type.
        type_name: String,
        /// The unmatched parameter.
        parameter: String,
    },

    /// Two constructor parameters resolved to the same logical name.
    #[error("duplicated constructor parameter {parameter} on {type_name}")]
    DuplicatedParameterName {
        /// Name of the offending type.
        type_name: String,
        /// The duplicated parameter.
        parameter: String,
    },

    /// A mapped field has no matching constructor parameter.
    #[error("no constructor parameter for field {field} on {type_name}")]
    MissingConstructorParameter {
        /// Name of the offending type.
        type_name: String,
        /// The field without a parameter.
        field: String,
    },

    /// A constructor argument was missing or carried the wrong type.
    #[error("constructor argument {parameter}: {message}")]
    ConstructorArgument {
        /// The offending parameter.
        parameter: String,
        /// Description of the problem.
        message: String,
    },

    /// A discriminator value has no registered type.
    #[error("unknown discriminator value: {value}")]
    UnknownDiscriminator {
        /// The unrecognized discriminator value.
        value: String,
    },

    /// No codec is available for a field's declared type.
    #[error("no codec for type {type_name} (field {field})")]
    NoCodecForType {
        /// Qualified name of the field.
        field: String,
        /// The field's declared type.
        type_name: String,
    },

    /// A collection name was never associated with a mapped type.
    #[error("no mapped type for collection {collection}")]
    UnknownCollection {
        /// The unknown collection name.
        collection: String,
    },

    /// An abstract or interface type cannot be instantiated directly.
    #[error("cannot instantiate {type_name}")]
    NotInstantiable {
        /// Name of the offending type.
        type_name: String,
    },

    /// Only entity types can be persisted as top-level documents.
    #[error("{type_name} is not a top-level entity type")]
    NotPersistable {
        /// Name of the offending type.
        type_name: String,
    },

    /// A runtime value did not carry the expected type.
    #[error("type mismatch in {context}: expected {expected}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// Where the mismatch occurred.
        context: String,
    },

    /// A stored value had the wrong shape for a field's codec.
    #[error("invalid value for {field}: expected {expected}, found {actual}")]
    InvalidValue {
        /// Qualified name of the field.
        field: String,
        /// The shape the codec expected.
        expected: &'static str,
        /// The shape the document carried.
        actual: &'static str,
    },
}

impl MappingError {
    /// Creates a not-mapped error.
    pub fn not_mapped(type_name: impl Into<String>) -> Self {
        Self::NotMapped {
            type_name: type_name.into(),
        }
    }

    /// Creates a missing-identifier error.
    pub fn missing_id_field(type_name: impl Into<String>) -> Self {
        Self::MissingIdField {
            type_name: type_name.into(),
        }
    }

    /// Creates an identifier-on-non-entity error.
    pub fn id_on_non_entity(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::IdOnNonEntity {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates an ambiguous-stored-field error.
    pub fn ambiguous_stored_field(field: impl Into<String>, names: &[&str]) -> Self {
        Self::AmbiguousStoredField {
            field: field.into(),
            names: names.join(", "),
        }
    }

    /// Creates an unknown-discriminator error.
    pub fn unknown_discriminator(value: impl Into<String>) -> Self {
        Self::UnknownDiscriminator {
            value: value.into(),
        }
    }

    /// Creates a no-codec error.
    pub fn no_codec(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::NoCodecForType {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(collection: impl Into<String>) -> Self {
        Self::UnknownCollection {
            collection: collection.into(),
        }
    }

    /// Creates a not-instantiable error.
    pub fn not_instantiable(type_name: impl Into<String>) -> Self {
        Self::NotInstantiable {
            type_name: type_name.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, context: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            context: context.into(),
        }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(
        field: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            expected,
            actual,
        }
    }
}

/// Errors raised at reference-resolution or reference-encode time.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// A referenced entity does not exist in its target collection.
    #[error("missing referenced entity {id} of type {target}")]
    MissingEntity {
        /// Name of the referenced type.
        target: String,
        /// Display form of the missing identifier.
        id: String,
    },

    /// A reference to an unsaved entity cannot be encoded.
    #[error("no id for reference to {target}: entity was never saved")]
    NoId {
        /// Name of the referenced type.
        target: String,
    },

    /// The reference carries no datastore handle and cannot resolve.
    #[error("reference to {target} is detached from any datastore")]
    Detached {
        /// Name of the referenced type.
        target: String,
    },
}

impl ReferenceError {
    /// Creates a missing-entity error.
    pub fn missing_entity(target: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingEntity {
            target: target.into(),
            id: id.into(),
        }
    }

    /// Creates a no-id error.
    pub fn no_id(target: impl Into<String>) -> Self {
        Self::NoId {
            target: target.into(),
        }
    }

    /// Creates a detached-reference error.
    pub fn detached(target: impl Into<String>) -> Self {
        Self::Detached {
            target: target.into(),
        }
    }
}

/// A batch of structural constraint violations that reached fatal severity.
///
/// Non-fatal violations are logged during validation and never surface
/// here; a `ValidationFailure` always carries at least one violation at
/// [`crate::validation::Level::Severe`] or above.
#[derive(Debug)]
pub struct ValidationFailure {
    violations: Vec<ConstraintViolation>,
}

impl ValidationFailure {
    /// Creates a failure from a batch of violations.
    #[must_use]
    pub fn new(violations: Vec<ConstraintViolation>) -> Self {
        Self { violations }
    }

    /// Creates a failure from a single violation.
    #[must_use]
    pub fn single(violation: ConstraintViolation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    /// The collected violations.
    #[must_use]
    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mapping validation failed:")?;
        for violation in &self.violations {
            writeln!(f, "  {}", violation.render())?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}
