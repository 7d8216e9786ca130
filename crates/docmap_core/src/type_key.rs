//! Stable runtime type identity.

use std::any::TypeId;
use std::fmt;

/// Identity of a Rust type as seen by the mapping layer.
///
/// A `TypeKey` pairs the compiler's [`TypeId`] (which distinguishes full
/// generic signatures: `Vec<String>` and `Vec<i64>` have different ids)
/// with the type's name for diagnostics. Keys are the currency of the
/// registry: the type cache, the subtype graph, and the type-codec registry
/// are all keyed by them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for a type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        // Strip the module path but keep generic arguments readable.
        match self.name.split('<').next() {
            Some(base) => {
                let start = base.rfind("::").map_or(0, |i| i + 2);
                &self.name[start..]
            }
            None => self.name,
        }
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
