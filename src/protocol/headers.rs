//! Frame headers and continuation signaling.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Default correlation id header.
pub const DEFAULT_ID_HEADER: &str = "x-id";

/// Default "more frames follow" header.
pub const DEFAULT_MORE_HEADER: &str = "x-more";

/// Canonical `Connection` header used by [`Continuation::ConnectionHeader`].
pub const CONNECTION_HEADER: &str = "Connection";

/// `Connection` value meaning more frames follow.
pub const KEEP_ALIVE: &str = "keep-alive";

/// `Connection` value marking the terminal frame.
pub const CLOSE: &str = "close";

// ============================================================================
// Headers
// ============================================================================

/// String-keyed header mapping carried by every frame.
///
/// Values are JSON values so that compact wire aliases (`{"con": 1}`) and
/// numeric correlation ids survive the codec unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Map<String, Value>);

impl Headers {
    /// Creates an empty header set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Returns a header value.
    ///
    /// Tries the exact name first, then falls back to a case-insensitive match.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Returns a header value as a string slice.
    #[inline]
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Removes a header by exact and case-insensitive name.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let exact = self.0.remove(name);
        let folded: Vec<String> = self
            .0
            .keys()
            .filter(|key| key.eq_ignore_ascii_case(name))
            .cloned()
            .collect();

        let mut removed = exact;
        for key in folded {
            let value = self.0.remove(&key);
            removed = removed.or(value);
        }
        removed
    }

    /// Returns `true` if the header is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of headers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no headers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copies every header from `other` that is not already set here.
    pub fn merge_missing(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            if !self.contains(name) {
                self.0.insert(name.clone(), value.clone());
            }
        }
    }

    /// Consumes the headers and returns the underlying map.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Parses a positive correlation id from the named header.
    ///
    /// Accepts a JSON integer or a numeric string.
    #[must_use]
    pub fn correlation_id(&self, name: &str) -> Option<u64> {
        let id = match self.get(name)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }?;
        (id > 0).then_some(id)
    }

    /// Returns the truthiness of the named header; absent is `false`.
    #[must_use]
    pub fn is_truthy(&self, name: &str) -> bool {
        match self.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

impl From<Map<String, Value>> for Headers {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Continuation
// ============================================================================

/// How a frame signals that more frames of the same exchange follow.
///
/// Checked against canonical (translated inward) headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// A dedicated truthy header marks non-terminal frames.
    Flag {
        /// Header name, e.g. `x-more`.
        header: String,
    },
    /// `Connection: keep-alive` marks non-terminal frames, `Connection: close` the last.
    ConnectionHeader,
}

impl Default for Continuation {
    fn default() -> Self {
        Self::flag(DEFAULT_MORE_HEADER)
    }
}

impl Continuation {
    /// Creates a flag-header continuation.
    #[inline]
    #[must_use]
    pub fn flag(header: impl Into<String>) -> Self {
        Self::Flag {
            header: header.into(),
        }
    }

    /// Returns `true` if the frame carrying these headers is not the last one.
    #[must_use]
    pub fn is_more(&self, headers: &Headers) -> bool {
        match self {
            Self::Flag { header } => headers.is_truthy(header),
            Self::ConnectionHeader => headers
                .get_str(CONNECTION_HEADER)
                .is_some_and(|value| value.eq_ignore_ascii_case(KEEP_ALIVE)),
        }
    }

    /// Writes the continuation indicator into outgoing headers.
    pub fn apply(&self, headers: &mut Headers, more: bool) {
        match self {
            Self::Flag { header } => {
                if more {
                    headers.set(header.clone(), true);
                } else {
                    headers.remove(header);
                }
            }
            Self::ConnectionHeader => {
                headers.remove(CONNECTION_HEADER);
                headers.set(CONNECTION_HEADER, if more { KEEP_ALIVE } else { CLOSE });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_get_falls_back_to_case_insensitive() {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        assert_eq!(headers.get_str("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get_str("content-type"), Some("text/plain"));
        assert_eq!(headers.get("accept"), None);
    }

    #[test]
    fn test_remove_folds_case() {
        let mut headers: Headers = [("Accept", "a"), ("accept", "b")].into_iter().collect();
        assert!(headers.remove("accept").is_some());
        assert!(headers.is_empty());
        assert_eq!(headers.remove("accept"), None);
    }

    #[test]
    fn test_correlation_id() {
        let mut headers = Headers::new();
        assert_eq!(headers.correlation_id("x-id"), None);

        headers.set("x-id", 12);
        assert_eq!(headers.correlation_id("x-id"), Some(12));

        headers.set("x-id", "13");
        assert_eq!(headers.correlation_id("x-id"), Some(13));

        headers.set("x-id", 0);
        assert_eq!(headers.correlation_id("x-id"), None);

        headers.set("x-id", json!(-4));
        assert_eq!(headers.correlation_id("x-id"), None);

        headers.set("x-id", "abc");
        assert_eq!(headers.correlation_id("x-id"), None);
    }

    #[test]
    fn test_truthiness() {
        let mut headers = Headers::new();
        assert!(!headers.is_truthy("x-more"));

        for (value, expected) in [
            (json!(true), true),
            (json!(false), false),
            (json!(1), true),
            (json!(0), false),
            (json!("yes"), true),
            (json!(""), false),
            (json!(null), false),
        ] {
            headers.set("x-more", value.clone());
            assert_eq!(headers.is_truthy("x-more"), expected, "value {value}");
        }
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut headers: Headers = [("host", "frame")].into_iter().collect();
        let upgrade: Headers = [("host", "upgrade"), ("user-agent", "ua")]
            .into_iter()
            .collect();

        headers.merge_missing(&upgrade);
        assert_eq!(headers.get_str("host"), Some("frame"));
        assert_eq!(headers.get_str("user-agent"), Some("ua"));
    }

    #[test]
    fn test_flag_continuation() {
        let continuation = Continuation::default();
        let mut headers = Headers::new();

        continuation.apply(&mut headers, true);
        assert!(continuation.is_more(&headers));

        continuation.apply(&mut headers, false);
        assert!(!continuation.is_more(&headers));
        assert!(!headers.contains(DEFAULT_MORE_HEADER));
    }

    #[test]
    fn test_connection_header_continuation() {
        let continuation = Continuation::ConnectionHeader;
        let mut headers = Headers::new();
        assert!(!continuation.is_more(&headers));

        continuation.apply(&mut headers, true);
        assert_eq!(headers.get_str("Connection"), Some("keep-alive"));
        assert!(continuation.is_more(&headers));

        continuation.apply(&mut headers, false);
        assert_eq!(headers.get_str("Connection"), Some("close"));
        assert!(!continuation.is_more(&headers));
    }
}
