//! Dotted field-path resolution.

use crate::error::{CoreResult, ValidationFailure};
use crate::field_model::FieldModel;
use crate::mapped_class::MappedClass;
use crate::mapper::Mapper;
use crate::validation::{ConstraintViolation, Level};
use std::sync::Arc;

/// A dotted logical field path resolved against the metadata graph.
///
/// Each segment naming a declared field translates to its stored name;
/// segments that already match a stored name pass through unchanged, as do
/// numeric indices and positional operators (`$`, `$[...]`). When a
/// segment lands on a field whose element type is itself mapped, the walk
/// descends into that type, including through interface-typed fields,
/// where the concrete subtype to descend into is found by trying each
/// known subtype for the next segment.
#[derive(Debug)]
pub struct PathTarget {
    translated: String,
    target: Option<Arc<FieldModel>>,
}

impl PathTarget {
    /// Resolves a dotted path starting at a mapped type.
    ///
    /// With `validate` set, an unresolvable segment fails with a
    /// validation error naming the segment; without it, the untranslated
    /// remainder is passed through and the terminal field is `None`.
    pub fn resolve(
        mapper: &Mapper,
        root: &Arc<MappedClass>,
        path: &str,
        validate: bool,
    ) -> CoreResult<Self> {
        let mut current: Option<Arc<MappedClass>> = Some(Arc::clone(root));
        let mut target: Option<Arc<FieldModel>> = None;
        let mut translated: Vec<String> = Vec::new();

        let segments: Vec<&str> = path.split('.').collect();
        for (index, segment) in segments.iter().enumerate() {
            if is_positional(segment) {
                // Index/positional segments keep the current type context.
                translated.push((*segment).to_string());
                continue;
            }

            let Some(class) = current.clone() else {
                // Past an unmapped leaf: the segment has nothing to
                // resolve against.
                if validate {
                    return Err(ValidationFailure::single(ConstraintViolation::new(
                        Level::Fatal,
                        root.name(),
                        "PathTarget",
                        format!("could not resolve segment {segment:?} in path {path:?}"),
                    ))
                    .into());
                }
                translated.extend(segments[index..].iter().map(|s| (*s).to_string()));
                return Ok(Self {
                    translated: translated.join("."),
                    target: None,
                });
            };

            match find_field(mapper, &class, segment) {
                Some(field) => {
                    translated.push(field.stored_name().to_string());
                    if field.is_map_shaped() {
                        // Map keys are opaque: the remainder passes
                        // through untranslated, the map stays the target.
                        translated
                            .extend(segments[index + 1..].iter().map(|s| (*s).to_string()));
                        return Ok(Self {
                            translated: translated.join("."),
                            target: Some(field),
                        });
                    }
                    current = field
                        .element()
                        .or(Some(field.type_key()))
                        .and_then(|key| mapper.class_by_type(key.type_id()));
                    target = Some(field);
                }
                None if validate => {
                    return Err(ValidationFailure::single(ConstraintViolation::new(
                        Level::Fatal,
                        class.name(),
                        "PathTarget",
                        format!("could not resolve segment {segment:?} in path {path:?}"),
                    ))
                    .into());
                }
                None => {
                    // Give up on translation: emit the rest verbatim.
                    translated.extend(segments[index..].iter().map(|s| (*s).to_string()));
                    return Ok(Self {
                        translated: translated.join("."),
                        target: None,
                    });
                }
            }
        }

        Ok(Self {
            translated: translated.join("."),
            target,
        })
    }

    /// The stored-path string.
    #[must_use]
    pub fn translated_path(&self) -> &str {
        &self.translated
    }

    /// The terminal resolved field, if the path ended on one.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<FieldModel>> {
        self.target.as_ref()
    }
}

fn is_positional(segment: &str) -> bool {
    segment == "$"
        || segment.starts_with("$[")
        || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
}

/// Finds a field by declared or stored name, descending into known
/// subtypes when the class itself (an interface or abstract supertype)
/// does not declare the segment.
fn find_field(mapper: &Mapper, class: &Arc<MappedClass>, segment: &str) -> Option<Arc<FieldModel>> {
    if let Some(field) = class.field_by_stored_name(segment) {
        return Some(Arc::clone(field));
    }
    for subtype in mapper.subtypes_of(class.type_key().type_id()) {
        if let Some(field) = find_field(mapper, &subtype, segment) {
            return Some(field);
        }
    }
    None
}
