//! Mapper configuration.

use crate::naming::NamingStrategy;

/// Configuration for a [`crate::Mapper`].
///
/// Options are read once, when a type is first mapped; changing strategies
/// afterwards requires a fresh mapper.
#[derive(Debug, Clone)]
pub struct MapperOptions {
    /// Document key under which a discriminator value is stored.
    pub discriminator_key: String,

    /// Strategy deriving collection names from entity names.
    pub collection_naming: NamingStrategy,

    /// Strategy deriving stored field names from declared field names.
    pub field_naming: NamingStrategy,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            discriminator_key: "_t".to_string(),
            collection_naming: NamingStrategy::Identity,
            field_naming: NamingStrategy::Identity,
        }
    }
}

impl MapperOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the discriminator key.
    #[must_use]
    pub fn discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    /// Sets the collection naming strategy.
    #[must_use]
    pub const fn collection_naming(mut self, strategy: NamingStrategy) -> Self {
        self.collection_naming = strategy;
        self
    }

    /// Sets the field naming strategy.
    #[must_use]
    pub const fn field_naming(mut self, strategy: NamingStrategy) -> Self {
        self.field_naming = strategy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = MapperOptions::default();
        assert_eq!(options.discriminator_key, "_t");
        assert_eq!(options.collection_naming, NamingStrategy::Identity);
        assert_eq!(options.field_naming, NamingStrategy::Identity);
    }

    #[test]
    fn builder_pattern() {
        let options = MapperOptions::new()
            .discriminator_key("_type")
            .field_naming(NamingStrategy::SnakeCase);

        assert_eq!(options.discriminator_key, "_type");
        assert_eq!(options.field_naming, NamingStrategy::SnakeCase);
    }
}
