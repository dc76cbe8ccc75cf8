//! MetaData: ordered, unique string key/value pairs attached to archives,
//! objects and properties.

use crate::util::{Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Ordered string map.
///
/// Keys are unique; re-setting a key replaces its value in place so the
/// original insertion order is kept. Equality is order-sensitive, matching
/// the serialized form.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    /// Application that wrote the archive.
    pub const APPLICATION_KEY: &'static str = "_ai_Application";
    /// Wall-clock time the archive was written.
    pub const DATE_WRITTEN_KEY: &'static str = "_ai_DateWritten";
    /// Free-form user description.
    pub const DESCRIPTION_KEY: &'static str = "_ai_Description";
    /// Library version string of the writer.
    pub const LIBRARY_VERSION_KEY: &'static str = "_ai_AlembicVersion";
    /// Interpretation hint (e.g. "point", "vector").
    pub const INTERPRETATION_KEY: &'static str = "interpretation";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any existing value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a value only if `key` is absent or already holds the same value.
    pub fn set_unique(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        match self.get(&key) {
            Some(existing) if existing != value => Err(Error::invalid(format!(
                "metadata key '{}' already set to '{}'",
                key, existing
            ))),
            Some(_) => Ok(()),
            None => {
                self.entries.push((key, value));
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over key-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append every entry of `other`, replacing values of shared keys.
    pub fn extend(&mut self, other: &MetaData) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Same entries with the same values, in any order.
    pub fn matches_exactly(&self, other: &MetaData) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }

    /// No key present in both carries different values.
    pub fn matches_overlap(&self, other: &MetaData) -> bool {
        self.iter()
            .all(|(k, v)| other.get(k).map_or(true, |ov| ov == v))
    }

    /// Serialize to `key=value;key2=value2`, escaping `\`, `;` and `=`.
    pub fn serialize(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                result.push(';');
            }
            escape_into(&mut result, k);
            result.push('=');
            escape_into(&mut result, v);
        }
        result
    }

    /// Parse the serialized form. Inverse of [`serialize`](Self::serialize).
    ///
    /// Entries without a `=` separator are skipped; empty keys and values
    /// are kept.
    pub fn parse(s: &str) -> Self {
        let mut meta = Self::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = s.chars();

        let mut flush = |key: &mut String, value: &mut String, in_value: bool| {
            if in_value {
                meta.set(std::mem::take(key), std::mem::take(value));
            }
            key.clear();
            value.clear();
        };

        while let Some(c) = chars.next() {
            let target = if in_value { &mut value } else { &mut key };
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => target.push(escaped),
                    None => target.push('\\'),
                },
                ';' => {
                    flush(&mut key, &mut value, in_value);
                    in_value = false;
                }
                '=' if !in_value => in_value = true,
                _ => target.push(c),
            }
        }
        flush(&mut key, &mut value, in_value);
        meta
    }

    pub fn interpretation(&self) -> Option<&str> {
        self.get(Self::INTERPRETATION_KEY)
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, '\\' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}
