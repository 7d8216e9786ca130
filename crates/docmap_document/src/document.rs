//! Insertion-ordered document map.

use crate::value::Value;
use std::fmt;

/// A string-keyed document that preserves insertion order.
///
/// Mapped entities encode to documents whose field order mirrors field
/// declaration order, so this type deliberately does not sort or hash its
/// keys. Inserting an existing key replaces the value in place, keeping the
/// key's original position.
///
/// Documents are small (one entry per mapped field), so lookups scan the
/// entry list.
#[derive(Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key-value pair.
    ///
    /// If the key already exists, the value is replaced in place and the
    /// previous value is returned; the key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Removes a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns true if the document contains the key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the document has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut doc = Document::new();
        doc.insert("z", Value::Int(1));
        doc.insert("a", Value::Int(2));
        doc.insert("m", Value::Int(3));

        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut doc = Document::new();
        doc.insert("a", Value::Int(1));
        doc.insert("b", Value::Int(2));

        let old = doc.insert("a", Value::Int(10));
        assert_eq!(old, Some(Value::Int(1)));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn remove_and_contains() {
        let mut doc = Document::new();
        doc.insert("a", Value::Int(1));

        assert!(doc.contains_key("a"));
        assert_eq!(doc.remove("a"), Some(Value::Int(1)));
        assert!(!doc.contains_key("a"));
        assert_eq!(doc.remove("a"), None);
        assert!(doc.is_empty());
    }

    #[test]
    fn from_iterator() {
        let doc: Document = vec![
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]
        .into_iter()
        .collect();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("y"), Some(&Value::Int(2)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn insert_then_get(keys in proptest::collection::vec("[a-z]{1,8}", 1..20)) {
                let mut doc = Document::new();
                for (i, key) in keys.iter().enumerate() {
                    doc.insert(key.clone(), Value::Int(i as i64));
                }
                // The last insert for each key wins, and every key is present.
                for key in &keys {
                    let last = keys.iter().rposition(|k| k == key).unwrap();
                    prop_assert_eq!(doc.get(key), Some(&Value::Int(last as i64)));
                }
                // No duplicate keys survive.
                let mut seen = keys.clone();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(doc.len(), seen.len());
            }
        }
    }
}
