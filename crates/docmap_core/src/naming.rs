//! Naming strategies for stored names.

use convert_case::{Case, Casing};

/// A pure transform from a declared name to a stored name.
///
/// Strategies are consulted exactly once per field (and once per entity for
/// the collection name) during discovery; the computed names are frozen in
/// the descriptor tree and never re-derived.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum NamingStrategy {
    /// Use the declared name unchanged.
    #[default]
    Identity,
    /// `camelCaseName` becomes `camel_case_name`.
    SnakeCase,
    /// `camelCaseName` becomes `camel-case-name`.
    KebabCase,
    /// `snake_case_name` becomes `snakeCaseName`.
    CamelCase,
    /// A caller-supplied transform.
    Custom(fn(&str) -> String),
}

impl NamingStrategy {
    /// Applies the strategy to a declared name.
    #[must_use]
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::Identity => name.to_string(),
            Self::SnakeCase => name.to_case(Case::Snake),
            Self::KebabCase => name.to_case(Case::Kebab),
            Self::CamelCase => name.to_case(Case::Camel),
            Self::Custom(transform) => transform(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_name() {
        assert_eq!(NamingStrategy::Identity.apply("firstName"), "firstName");
    }

    #[test]
    fn snake_case() {
        assert_eq!(NamingStrategy::SnakeCase.apply("firstName"), "first_name");
        assert_eq!(NamingStrategy::SnakeCase.apply("Address"), "address");
    }

    #[test]
    fn kebab_case() {
        assert_eq!(NamingStrategy::KebabCase.apply("firstName"), "first-name");
    }

    #[test]
    fn camel_case() {
        assert_eq!(NamingStrategy::CamelCase.apply("first_name"), "firstName");
    }

    #[test]
    fn custom_transform() {
        let strategy = NamingStrategy::Custom(|name| format!("x_{name}"));
        assert_eq!(strategy.apply("field"), "x_field");
    }
}
