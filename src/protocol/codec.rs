//! Pluggable wire codec.
//!
//! A codec turns a [`Frame`] into a transport [`Payload`] and a payload back
//! into a raw JSON value. Decoded values are validated by the connection
//! before dispatch, so a codec never needs to understand frame semantics.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::Payload;

use super::Frame;

// ============================================================================
// Codec
// ============================================================================

/// Encoder/decoder between frames and transport payloads.
///
/// Implementations must be stateless or internally synchronized: one codec
/// instance is shared by every exchange of a connection.
pub trait Codec: Debug + Send + Sync {
    /// Encodes a frame into a transport payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the frame cannot be encoded.
    fn encode(&self, frame: &Frame) -> Result<Payload>;

    /// Decodes a transport payload into an unvalidated value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the payload is not decodable.
    fn decode(&self, payload: &Payload) -> Result<Value>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON codec sending text messages.
///
/// Binary payloads are accepted on decode if they hold UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, frame: &Frame) -> Result<Payload> {
        serde_json::to_string(frame)
            .map(Payload::Text)
            .map_err(|e| Error::codec(format!("JSON encode failed: {e}")))
    }

    fn decode(&self, payload: &Payload) -> Result<Value> {
        let decoded = match payload {
            Payload::Text(text) => serde_json::from_str(text),
            Payload::Binary(bytes) => serde_json::from_slice(bytes),
        };

        decoded.map_err(|e| Error::codec(format!("JSON decode failed: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
