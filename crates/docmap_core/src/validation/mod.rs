//! Structural constraint checks run once per mapped type.
//!
//! Each rule is independent; violations are collected as a batch with
//! severity levels. Non-fatal violations are logged and do not block
//! mapping; any violation at [`Level::Severe`] or above fails the type's
//! validation pass as a whole.

mod rules;

use crate::error::ValidationFailure;
use crate::mapped_class::MappedClass;
use std::fmt;
use tracing::warn;

pub(crate) use rules::standard_constraints;

/// Severity of a constraint violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Cosmetic.
    Minor,
    /// Informational.
    Info,
    /// Suspicious but mappable.
    Warning,
    /// Blocks mapping.
    Severe,
    /// Blocks mapping; the metadata is unusable.
    Fatal,
}

/// One recorded violation of a structural constraint.
#[derive(Clone, Debug)]
pub struct ConstraintViolation {
    level: Level,
    type_name: String,
    field: Option<String>,
    constraint: &'static str,
    message: String,
}

impl ConstraintViolation {
    /// Records a type-level violation.
    #[must_use]
    pub fn new(
        level: Level,
        type_name: impl Into<String>,
        constraint: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            type_name: type_name.into(),
            field: None,
            constraint,
            message: message.into(),
        }
    }

    /// Records a field-level violation.
    #[must_use]
    pub fn on_field(
        level: Level,
        type_name: impl Into<String>,
        field: impl Into<String>,
        constraint: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(level, type_name, constraint, message)
        }
    }

    /// The severity of this violation.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// The qualified name of the failing mapping.
    #[must_use]
    pub fn prefix(&self) -> String {
        match &self.field {
            Some(field) => format!("{}.{}", self.type_name, field),
            None => self.type_name.clone(),
        }
    }

    /// A human-friendly rendering of the violation.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{} complained about {}: {}",
            self.constraint,
            self.prefix(),
            self.message
        )
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// An independent structural constraint on a mapped type.
pub trait ClassConstraint: Send + Sync {
    /// The constraint's name, used in rendered violations.
    fn name(&self) -> &'static str;

    /// Checks the mapped type, recording any violations.
    fn check(&self, mapped: &MappedClass, violations: &mut Vec<ConstraintViolation>);
}

/// Runs the constraint chain against one mapped type.
pub struct MappingValidator {
    constraints: Vec<Box<dyn ClassConstraint>>,
}

impl Default for MappingValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingValidator {
    /// Creates a validator with the standard constraint chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constraints: standard_constraints(),
        }
    }

    /// Validates one mapped type.
    ///
    /// Non-fatal violations are logged; if any violation reaches
    /// [`Level::Severe`], the whole collected batch is returned as a
    /// [`ValidationFailure`].
    pub fn validate(&self, mapped: &MappedClass) -> Result<(), ValidationFailure> {
        let mut violations = Vec::new();
        for constraint in &self.constraints {
            constraint.check(mapped, &mut violations);
        }

        for violation in violations.iter().filter(|v| v.level() < Level::Severe) {
            warn!(violation = %violation, "constraint violation");
        }

        if violations.iter().any(|v| v.level() >= Level::Severe) {
            Err(ValidationFailure::new(violations))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Fatal > Level::Severe);
        assert!(Level::Severe > Level::Warning);
        assert!(Level::Warning > Level::Info);
        assert!(Level::Info > Level::Minor);
    }

    #[test]
    fn render_names_type_and_field() {
        let violation = ConstraintViolation::on_field(
            Level::Fatal,
            "Order",
            "version",
            "MultipleVersions",
            "only one version field is allowed",
        );
        let rendered = violation.render();
        assert!(rendered.contains("MultipleVersions"));
        assert!(rendered.contains("Order.version"));
    }
}
