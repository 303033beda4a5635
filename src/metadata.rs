use alloc::string::String;
use alloc::vec::Vec;

use crate::BitmapError;

/// Typed metadata value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Int(i64),
    Rational { num: u32, den: u32 },
    Binary(Vec<u8>),
}

/// Format-agnostic tag map attached to a bitmap.
///
/// Keys are unique; `set` overwrites. Lookup misses fail with
/// [`BitmapError::KeyNotFound`] (this crate uses the error variant, not an
/// absent-value sentinel). Iteration order is insertion order, so
/// round-trip tests are deterministic; callers must not rely on any other
/// ordering guarantee.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: MetadataValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Look up `key`, failing with [`BitmapError::KeyNotFound`].
    pub fn get(&self, key: &str) -> Result<&MetadataValue, BitmapError> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| BitmapError::KeyNotFound(key.into()))
    }

    /// Remove and return the entry for `key`, failing with
    /// [`BitmapError::KeyNotFound`].
    pub fn remove(&mut self, key: &str) -> Result<MetadataValue, BitmapError> {
        let pos = self
            .entries
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| BitmapError::KeyNotFound(key.into()))?;
        Ok(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn set_overwrites() {
        let mut md = Metadata::new();
        md.set("author", MetadataValue::Text("a".to_string()));
        md.set("author", MetadataValue::Text("b".to_string()));
        assert_eq!(md.len(), 1);
        assert_eq!(
            md.get("author").unwrap(),
            &MetadataValue::Text("b".to_string())
        );
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let md = Metadata::new();
        assert!(matches!(md.get("nope"), Err(BitmapError::KeyNotFound(_))));
        let mut md = md;
        assert!(matches!(
            md.remove("nope"),
            Err(BitmapError::KeyNotFound(_))
        ));
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut md = Metadata::new();
        md.set("b", MetadataValue::Int(2));
        md.set("a", MetadataValue::Int(1));
        md.set("c", MetadataValue::Int(3));
        let keys: Vec<&str> = md.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }
}
