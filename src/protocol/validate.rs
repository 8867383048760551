//! Frame validation.
//!
//! Turns a decoded JSON value into a [`Frame`] or explains why it is not one.
//! Validation is pure; the connection decides what a failure means
//! (close with [`close_code::PROTOCOL_ERROR`](crate::transport::close_code::PROTOCOL_ERROR)).
//!
//! Checks run in order:
//!
//! 1. Value is an array of exactly three elements.
//! 2. Identifier is a request line (`METHOD path[?query]`) or an integer
//!    status in `0..=65535`. Fractional, negative or larger numbers are
//!    identifier errors; statuses are carried as `u16` like HTTP status codes.
//! 3. Headers are an object.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use super::{Frame, Headers, Identifier, RequestLine};

// ============================================================================
// FrameError
// ============================================================================

/// Reason a decoded message was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Message is not a 3-element array.
    #[error("message has an invalid structure (expected 3 elements, got {})", describe_len(.len))]
    NotATriple {
        /// Array length, `None` if the message is not an array.
        len: Option<usize>,
    },

    /// Identifier matches neither the request line nor the status pattern.
    #[error("message identifier is invalid: {identifier}")]
    InvalidIdentifier {
        /// The offending identifier, rendered as JSON.
        identifier: String,
    },

    /// Headers are null or not an object.
    #[error("message headers are invalid")]
    InvalidHeaders,
}

fn describe_len(len: &Option<usize>) -> String {
    len.map_or_else(|| "a non-array".to_string(), |len| len.to_string())
}

impl FrameError {
    /// Returns `true` for structural errors (shape or headers).
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::InvalidIdentifier { .. })
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates a decoded message and converts it into a [`Frame`].
///
/// # Errors
///
/// Returns a [`FrameError`] describing the first violated rule.
pub fn validate(value: Value) -> Result<Frame, FrameError> {
    let Value::Array(items) = value else {
        return Err(FrameError::NotATriple { len: None });
    };

    let [identifier, headers, body] = match <[Value; 3]>::try_from(items) {
        Ok(items) => items,
        Err(items) => {
            return Err(FrameError::NotATriple {
                len: Some(items.len()),
            });
        }
    };

    let identifier = parse_identifier(&identifier)?;

    let Value::Object(headers) = headers else {
        return Err(FrameError::InvalidHeaders);
    };

    let body = match body {
        Value::Null => None,
        other => Some(other),
    };

    Ok(Frame::new(identifier, Headers::from(headers), body))
}

/// Statuses outside the `u16` range are rejected rather than truncated.
fn parse_identifier(value: &Value) -> Result<Identifier, FrameError> {
    let parsed = match value {
        Value::String(line) => RequestLine::parse(line).map(Identifier::Request),
        Value::Number(n) => n
            .as_u64()
            .and_then(|status| u16::try_from(status).ok())
            .map(Identifier::Status),
        _ => None,
    };

    parsed.ok_or_else(|| FrameError::InvalidIdentifier {
        identifier: value.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
