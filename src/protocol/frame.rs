//! Frame model.
//!
//! A frame is the `[identifier, headers, body]` triplet carried by one
//! transport message.
//!
//! # Format
//!
//! Request-initiating frame:
//! ```json
//! ["POST /users?limit=10", { "x-id": 7, "x-more": true }, { "name": "a" }]
//! ```
//!
//! Response frame:
//! ```json
//! [200, { "x-id": 7 }, null]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::Value;

use super::Headers;

// ============================================================================
// Constants
// ============================================================================

/// Request line pattern: `METHOD path[?query]`.
static REQUEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(GET|POST|PUT|DELETE|HEAD|PATCH|SUB|PUB)\s(.+)$")
        .expect("request line pattern is valid")
});

// ============================================================================
// Method
// ============================================================================

/// Request verbs accepted in a request-initiating frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `PATCH`
    Patch,
    /// `SUB` (subscribe)
    Sub,
    /// `PUB` (publish)
    Pub,
}

impl Method {
    /// All accepted verbs.
    pub const ALL: [Method; 8] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Head,
        Method::Patch,
        Method::Sub,
        Method::Pub,
    ];

    /// Returns the wire spelling of the verb.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Sub => "SUB",
            Self::Pub => "PUB",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or(())
    }
}

// ============================================================================
// RequestLine
// ============================================================================

/// Parsed `METHOD path[?query]` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Request verb.
    pub method: Method,
    /// Path without query.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
}

impl RequestLine {
    /// Creates a request line without query.
    #[inline]
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
        }
    }

    /// Parses a request line, returning `None` if it does not match the pattern.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let captures = REQUEST_LINE.captures(line)?;
        let method = captures.get(1)?.as_str().parse().ok()?;
        let target = captures.get(2)?.as_str();

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        Some(Self {
            method,
            path,
            query,
        })
    }

    /// Returns the request target, `path[?query]`.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.target())
    }
}

// ============================================================================
// Identifier
// ============================================================================

/// First element of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Request-direction frame.
    Request(RequestLine),
    /// Response-direction frame carrying a status code.
    Status(u16),
}

impl Identifier {
    /// Returns `true` for request-direction frames.
    #[inline]
    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Converts the identifier to its JSON form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request(line) => Value::String(line.to_string()),
            Self::Status(status) => Value::from(*status),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(line) => serializer.collect_str(line),
            Self::Status(status) => serializer.serialize_u16(*status),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// The `(identifier, headers, body)` unit carried by one transport message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Request line or status.
    pub identifier: Identifier,
    /// Frame headers.
    pub headers: Headers,
    /// Body chunk; `None` means no chunk in this frame.
    pub body: Option<Value>,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(identifier: Identifier, headers: Headers, body: Option<Value>) -> Self {
        Self {
            identifier,
            headers,
            body,
        }
    }

    /// Converts the frame to its logical 3-element JSON array.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            self.identifier.to_value(),
            Value::Object(self.headers.clone().into_inner()),
            self.body.clone().unwrap_or(Value::Null),
        ])
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.identifier)?;
        tuple.serialize_element(&self.headers)?;
        tuple.serialize_element(&self.body)?;
        tuple.end()
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
    fn test_method_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>(), Ok(method));
        }
        assert!("OPTIONS".parse::<Method>().is_err());
    }

    #[test]
    fn test_parse_request_line() {
        let line = RequestLine::parse("GET /users?limit=10").expect("valid line");
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.path, "/users");
        assert_eq!(line.query.as_deref(), Some("limit=10"));
        assert_eq!(line.to_string(), "GET /users?limit=10");
    }

    #[test]
    fn test_parse_request_line_without_query() {
        let line = RequestLine::parse("SUB /events").expect("valid line");
        assert_eq!(line.method, Method::Sub);
        assert_eq!(line.query, None);
        assert_eq!(line.target(), "/events");
    }

    #[test]
    fn test_parse_rejects_unknown_verb() {
        assert!(RequestLine::parse("OPTIONS /").is_none());
        assert!(RequestLine::parse("GET").is_none());
        assert!(RequestLine::parse("get /").is_none());
        assert!(RequestLine::parse("").is_none());
    }

    #[test]
    fn test_frame_serializes_as_triplet() {
        let mut headers = Headers::new();
        headers.set("x-id", 4);

        let frame = Frame::new(
            Identifier::Request(RequestLine::new(Method::Post, "/items")),
            headers,
            Some(json!({ "a": 1 })),
        );

        let value = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(value, json!(["POST /items", { "x-id": 4 }, { "a": 1 }]));
        assert_eq!(value, frame.to_value());
    }

    #[test]
    fn test_status_frame_with_null_body() {
        let frame = Frame::new(Identifier::Status(204), Headers::new(), None);
        assert_eq!(frame.to_value(), json!([204, {}, null]));
        assert!(!frame.identifier.is_request());
    }
}
