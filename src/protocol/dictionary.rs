//! Header dictionary translation.
//!
//! Maps canonical header names and values to compact wire aliases and back.
//!
//! # Standard Dictionary
//!
//! | Canonical | Wire | Values |
//! |-----------|------|--------|
//! | `Connection` | `con` | `keep-alive` → `1`, `close` → `0` |
//! | `Etag` | `tag` | |
//! | `If-Match` | `ifm` | |
//! | `If-None-Match` | `inm` | |
//! | `Message-ID` | `mid` | |
//!
//! Headers absent from the dictionary pass through unchanged in both
//! directions, as do values missing from an entry's value table. The one
//! exception keeps translation reversible: a value of a table-carrying
//! header that looks like a wire value (`Connection: 1`) or like a
//! one-element array is sent wrapped in a one-element array.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};

use super::Headers;

// ============================================================================
// HeaderAlias
// ============================================================================

/// One dictionary entry: canonical name, wire name and optional value table.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderAlias {
    /// Canonical header name.
    pub canonical: String,
    /// Compact wire name.
    pub wire: String,
    /// Canonical string value → wire value.
    pub values: Vec<(String, Value)>,
}

impl HeaderAlias {
    /// Creates an alias without a value table.
    #[inline]
    #[must_use]
    pub fn new(canonical: impl Into<String>, wire: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            wire: wire.into(),
            values: Vec::new(),
        }
    }

    /// Adds a value table entry.
    #[inline]
    #[must_use]
    pub fn value(mut self, canonical: impl Into<String>, wire: impl Into<Value>) -> Self {
        self.values.push((canonical.into(), wire.into()));
        self
    }

    /// Returns `true` if `value` is the wire form of some table entry.
    fn is_wire_value(&self, value: &Value) -> bool {
        self.values.iter().any(|(_, wire)| wire == value)
    }

    /// Table values map to their wire form. Any other value that would read
    /// back as a table value, or as an escape, travels wrapped as `[value]`.
    fn value_to_wire(&self, value: &Value) -> Value {
        if let Some((_, wire)) = value
            .as_str()
            .and_then(|s| self.values.iter().find(|(canonical, _)| canonical == s))
        {
            return wire.clone();
        }

        if self.escapes() && (self.is_wire_value(value) || is_escaped(value)) {
            return Value::Array(vec![value.clone()]);
        }
        value.clone()
    }

    fn value_from_wire(&self, value: &Value) -> Value {
        if let Some((canonical, _)) = self.values.iter().find(|(_, wire)| wire == value) {
            return Value::String(canonical.clone());
        }

        match value {
            Value::Array(items) if self.escapes() && items.len() == 1 => items[0].clone(),
            _ => value.clone(),
        }
    }

    /// Escaping only applies to aliases with a value table.
    #[inline]
    fn escapes(&self) -> bool {
        !self.values.is_empty()
    }

    fn check_values(&self) -> Result<()> {
        for (index, (canonical, wire)) in self.values.iter().enumerate() {
            if wire.is_array() {
                return Err(Error::config(format!(
                    "Wire value for '{}: {canonical}' must not be an array",
                    self.canonical
                )));
            }
            let duplicate = self.values[..index]
                .iter()
                .any(|(other, other_wire)| other == canonical || other_wire == wire);
            if duplicate {
                return Err(Error::config(format!(
                    "Value '{canonical}' of '{}' is mapped twice",
                    self.canonical
                )));
            }
        }
        Ok(())
    }
}

fn is_escaped(value: &Value) -> bool {
    value.as_array().is_some_and(|items| items.len() == 1)
}

// ============================================================================
// HeaderDictionary
// ============================================================================

/// Bidirectional header name/value translator.
#[derive(Debug, Clone, Default)]
pub struct HeaderDictionary {
    aliases: Vec<HeaderAlias>,
    by_canonical: FxHashMap<String, usize>,
    by_wire: FxHashMap<String, usize>,
}

impl PartialEq for HeaderDictionary {
    fn eq(&self, other: &Self) -> bool {
        self.aliases == other.aliases
    }
}

impl HeaderDictionary {
    /// Creates an empty dictionary (identity translation).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard dictionary.
    #[must_use]
    pub fn standard() -> Self {
        let mut dictionary = Self::new();
        for alias in [
            HeaderAlias::new("Connection", "con")
                .value("keep-alive", 1)
                .value("close", 0),
            HeaderAlias::new("Etag", "tag"),
            HeaderAlias::new("If-Match", "ifm"),
            HeaderAlias::new("If-None-Match", "inm"),
            HeaderAlias::new("Message-ID", "mid"),
        ] {
            dictionary.push(alias);
        }
        dictionary
    }

    /// Adds an alias.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the canonical or wire name is already
    /// mapped, or the value table is ambiguous.
    pub fn insert(&mut self, alias: HeaderAlias) -> Result<()> {
        alias.check_values()?;

        if self.by_canonical.contains_key(&alias.canonical) {
            return Err(Error::config(format!(
                "Header '{}' is already in the dictionary",
                alias.canonical
            )));
        }

        if self.by_wire.contains_key(&alias.wire) {
            return Err(Error::config(format!(
                "Wire name '{}' is already mapped",
                alias.wire
            )));
        }

        self.push(alias);
        Ok(())
    }

    /// Adds an alias, builder style.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the canonical or wire name is already mapped.
    pub fn with(mut self, alias: HeaderAlias) -> Result<Self> {
        self.insert(alias)?;
        Ok(self)
    }

    fn push(&mut self, alias: HeaderAlias) {
        let index = self.aliases.len();
        self.by_canonical.insert(alias.canonical.clone(), index);
        self.by_wire.insert(alias.wire.clone(), index);
        self.aliases.push(alias);
    }

    /// Returns the number of aliases.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Returns `true` if the dictionary has no aliases.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Translates canonical headers to their wire form.
    #[must_use]
    pub fn to_wire(&self, headers: &Headers) -> Headers {
        if self.is_empty() {
            return headers.clone();
        }

        headers
            .iter()
            .map(|(name, value)| match self.by_canonical.get(name) {
                Some(&index) => {
                    let alias = &self.aliases[index];
                    (alias.wire.clone(), alias.value_to_wire(value))
                }
                None => (name.clone(), value.clone()),
            })
            .collect()
    }

    /// Translates wire headers back to their canonical form.
    #[must_use]
    pub fn from_wire(&self, headers: &Headers) -> Headers {
        if self.is_empty() {
            return headers.clone();
        }

        headers
            .iter()
            .map(|(name, value)| match self.by_wire.get(name) {
                Some(&index) => {
                    let alias = &self.aliases[index];
                    (alias.canonical.clone(), alias.value_from_wire(value))
                }
                None => (name.clone(), value.clone()),
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_connection_keep_alive_translation() {
        let dictionary = HeaderDictionary::standard();
        let headers: Headers = [("Connection", "keep-alive")].into_iter().collect();

        let wire = dictionary.to_wire(&headers);
        assert_eq!(wire.get("con"), Some(&json!(1)));
        assert!(wire.get("Connection").is_none());

        let back = dictionary.from_wire(&wire);
        assert_eq!(back, headers);
    }

    #[test]
    fn test_unknown_header_passes_through() {
        let dictionary = HeaderDictionary::standard();
        let headers: Headers = [("X-Custom", "foo")].into_iter().collect();

        assert_eq!(dictionary.to_wire(&headers), headers);
        assert_eq!(dictionary.from_wire(&headers), headers);
    }

    #[test]
    fn test_unmapped_value_passes_through() {
        let dictionary = HeaderDictionary::standard();
        let headers: Headers = [("Connection", "upgrade"), ("Message-ID", "m-1")]
            .into_iter()
            .collect();

        let wire = dictionary.to_wire(&headers);
        assert_eq!(wire.get_str("con"), Some("upgrade"));
        assert_eq!(wire.get_str("mid"), Some("m-1"));
        assert_eq!(dictionary.from_wire(&wire), headers);
    }

    #[test]
    fn test_colliding_value_is_escaped() {
        let dictionary = HeaderDictionary::standard();
        let headers: Headers = [("Connection", json!(1))].into_iter().collect();

        let wire = dictionary.to_wire(&headers);
        assert_eq!(wire.get("con"), Some(&json!([1])));
        assert_eq!(dictionary.from_wire(&wire), headers);
    }

    #[test]
    fn test_escape_shaped_value_round_trips() {
        let dictionary = HeaderDictionary::standard();
        let headers: Headers = [("Connection", json!([0])), ("Etag", json!([1]))]
            .into_iter()
            .collect();

        let wire = dictionary.to_wire(&headers);
        assert_eq!(wire.get("con"), Some(&json!([[0]])));
        assert_eq!(wire.get("tag"), Some(&json!([1])));
        assert_eq!(dictionary.from_wire(&wire), headers);
    }

    #[test]
    fn test_ambiguous_value_table_rejected() {
        let alias = HeaderAlias::new("X-Mode", "xm").value("on", 1).value("yes", 1);
        assert!(matches!(
            HeaderDictionary::new().with(alias),
            Err(Error::Config { .. })
        ));

        let alias = HeaderAlias::new("X-Mode", "xm").value("on", json!([1]));
        assert!(HeaderDictionary::new().with(alias).is_err());
    }

    #[test]
    fn test_duplicate_wire_name_rejected() {
        let result = HeaderDictionary::standard().with(HeaderAlias::new("X-Tag", "tag"));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_duplicate_canonical_name_rejected() {
        let result = HeaderDictionary::standard().with(HeaderAlias::new("Etag", "et"));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_empty_dictionary_is_identity() {
        let dictionary = HeaderDictionary::new();
        let headers: Headers = [("Connection", "close")].into_iter().collect();
        assert_eq!(dictionary.to_wire(&headers), headers);
    }

    fn canonical_headers() -> impl Strategy<Value = Headers> {
        let name = prop_oneof![
            Just("Connection".to_string()),
            Just("Etag".to_string()),
            Just("If-Match".to_string()),
            Just("If-None-Match".to_string()),
            Just("Message-ID".to_string()),
            "X-[A-Za-z]{1,8}",
        ];
        let scalar = prop_oneof![
            Just(json!("keep-alive")),
            Just(json!("close")),
            "[a-z0-9]{0,12}".prop_map(Value::from),
            (-2i64..3).prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ];
        let value = scalar.prop_recursive(2, 8, 3, |inner| {
            prop::collection::vec(inner, 0..3).prop_map(Value::Array)
        });
        prop::collection::btree_map(name, value, 0..6)
            .prop_map(|map| map.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_translation_round_trips(headers in canonical_headers()) {
            let dictionary = HeaderDictionary::standard();
            let back = dictionary.from_wire(&dictionary.to_wire(&headers));
            prop_assert_eq!(back, headers);
        }
    }
}
