//! Connection options.
//!
//! Controls header names, continuation signaling, dictionary translation,
//! buffering and keepalive behavior of a [`Connection`](super::Connection).
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ws_exchange::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_id_header("Message-ID")
//!     .with_chunk_capacity(32)
//!     .with_ping_interval(Duration::from_secs(15));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::protocol::{Continuation, DEFAULT_ID_HEADER, HeaderDictionary};

// ============================================================================
// Constants
// ============================================================================

/// Default per-exchange incoming chunk buffer.
pub const DEFAULT_CHUNK_CAPACITY: usize = 64;

/// Correlation id header of the compact preset.
pub const COMPACT_ID_HEADER: &str = "Message-ID";

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Connection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Header carrying the correlation id.
    pub id_header: String,

    /// Continuation signaling.
    pub continuation: Continuation,

    /// Canonical ↔ wire header translation.
    pub dictionary: HeaderDictionary,

    /// Unread chunks buffered per incoming stream. Overflow aborts that stream.
    pub chunk_capacity: usize,

    /// Keepalive interval installed on bind.
    pub ping_interval: Option<Duration>,

    /// Survive transport loss in the `Unbound` state instead of closing.
    pub reconnect: bool,

    /// Merge upgrade-request headers under incoming request headers.
    pub inherit_upgrade_headers: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    ///
    /// `x-id` correlation header, `x-more` continuation flag, no dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id_header: DEFAULT_ID_HEADER.to_string(),
            continuation: Continuation::default(),
            dictionary: HeaderDictionary::new(),
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            ping_interval: None,
            reconnect: false,
            inherit_upgrade_headers: false,
        }
    }

    /// Creates the compact preset.
    ///
    /// `Message-ID` correlation header, `Connection: keep-alive|close`
    /// continuation and the standard dictionary, so the wire carries
    /// `mid` and `con: 1|0`.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            id_header: COMPACT_ID_HEADER.to_string(),
            continuation: Continuation::ConnectionHeader,
            dictionary: HeaderDictionary::standard(),
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the correlation id header.
    #[inline]
    #[must_use]
    pub fn with_id_header(mut self, header: impl Into<String>) -> Self {
        self.id_header = header.into();
        self
    }

    /// Sets continuation signaling.
    #[inline]
    #[must_use]
    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = continuation;
        self
    }

    /// Sets the header dictionary.
    #[inline]
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: HeaderDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Sets the per-exchange incoming chunk buffer.
    #[inline]
    #[must_use]
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    /// Enables reconnect mode.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self) -> Self {
        self.reconnect = true;
        self
    }

    /// Enables upgrade header inheritance.
    #[inline]
    #[must_use]
    pub fn with_upgrade_headers(mut self) -> Self {
        self.inherit_upgrade_headers = true;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.id_header.trim().is_empty() {
            return Err("Correlation id header must not be empty".to_string());
        }

        if let Continuation::Flag { header } = &self.continuation {
            if header.trim().is_empty() {
                return Err("Continuation header must not be empty".to_string());
            }
            if header.eq_ignore_ascii_case(&self.id_header) {
                return Err(format!(
                    "Continuation header '{header}' collides with the correlation id header"
                ));
            }
        }

        if self.chunk_capacity == 0 {
            return Err("Chunk capacity must be greater than zero".to_string());
        }

        if self.ping_interval.is_some_and(|interval| interval.is_zero()) {
            return Err("Ping interval must be greater than zero".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = ConnectionOptions::new();
        assert_eq!(options.id_header, "x-id");
        assert_eq!(options.continuation, Continuation::flag("x-more"));
        assert!(options.dictionary.is_empty());
        assert_eq!(options.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
        assert!(options.ping_interval.is_none());
        assert!(!options.reconnect);
        assert!(!options.inherit_upgrade_headers);
        assert_eq!(options, ConnectionOptions::default());
    }

    #[test]
    fn test_compact_preset() {
        let options = ConnectionOptions::compact();
        assert_eq!(options.id_header, "Message-ID");
        assert_eq!(options.continuation, Continuation::ConnectionHeader);
        assert_eq!(options.dictionary.len(), 5);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ConnectionOptions::new()
            .with_id_header("id")
            .with_chunk_capacity(4)
            .with_ping_interval(Duration::from_secs(5))
            .with_reconnect()
            .with_upgrade_headers();

        assert_eq!(options.id_header, "id");
        assert_eq!(options.chunk_capacity, 4);
        assert_eq!(options.ping_interval, Some(Duration::from_secs(5)));
        assert!(options.reconnect);
        assert!(options.inherit_upgrade_headers);
    }

    #[test]
    fn test_validate_empty_id_header() {
        assert!(ConnectionOptions::new().with_id_header(" ").validate().is_err());
    }

    #[test]
    fn test_validate_colliding_headers() {
        let options = ConnectionOptions::new()
            .with_id_header("x-more")
            .with_continuation(Continuation::flag("X-More"));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_zero_capacity() {
        assert!(ConnectionOptions::new().with_chunk_capacity(0).validate().is_err());
    }

    #[test]
    fn test_validate_zero_ping() {
        let options = ConnectionOptions::new().with_ping_interval(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
