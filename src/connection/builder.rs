//! Builder for connections.
//!
//! # Example
//!
//! ```ignore
//! use ws_exchange::{Connection, ConnectionOptions};
//!
//! let connection = Connection::builder()
//!     .options(ConnectionOptions::compact())
//!     .router(|request, response| { /* ... */ })
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Codec, Continuation, HeaderDictionary, JsonCodec};
use crate::router::Router;

use super::core::Connection;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for [`Connection`].
///
/// Cloneable so one configured builder can stamp out a connection per
/// accepted socket.
#[derive(Clone, Default)]
pub struct ConnectionBuilder {
    options: ConnectionOptions,
    codec: Option<Arc<dyn Codec>>,
    router: Option<Arc<dyn Router>>,
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("options", &self.options)
            .field("codec", &self.codec)
            .field("router", &self.router.is_some())
            .finish()
    }
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the correlation id header.
    #[inline]
    #[must_use]
    pub fn id_header(mut self, header: impl Into<String>) -> Self {
        self.options.id_header = header.into();
        self
    }

    /// Sets continuation signaling.
    #[inline]
    #[must_use]
    pub fn continuation(mut self, continuation: Continuation) -> Self {
        self.options.continuation = continuation;
        self
    }

    /// Sets the header dictionary.
    #[inline]
    #[must_use]
    pub fn dictionary(mut self, dictionary: HeaderDictionary) -> Self {
        self.options.dictionary = dictionary;
        self
    }

    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.options.ping_interval = Some(interval);
        self
    }

    /// Enables reconnect mode.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self) -> Self {
        self.options.reconnect = true;
        self
    }

    /// Sets the payload codec. Defaults to [`JsonCodec`].
    #[inline]
    #[must_use]
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Sets the router receiving inbound exchanges.
    #[inline]
    #[must_use]
    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Some(Arc::new(router));
        self
    }

    /// Builds an unbound connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid.
    pub fn build(self) -> Result<Connection> {
        self.options.validate().map_err(Error::config)?;

        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));
        Ok(Connection::new(self.options, codec, self.router))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::connection::ConnectionState;
    use crate::exchange::{IncomingRequest, OutgoingResponse};

    #[test]
    fn test_builder_default() {
        let builder = ConnectionBuilder::new();
        assert_eq!(builder.options, ConnectionOptions::default());
        assert!(builder.codec.is_none());
        assert!(builder.router.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let builder = ConnectionBuilder::new()
            .id_header("Message-ID")
            .continuation(Continuation::ConnectionHeader)
            .dictionary(HeaderDictionary::standard())
            .ping_interval(Duration::from_secs(30))
            .reconnect();

        let expected = ConnectionOptions::compact()
            .with_ping_interval(Duration::from_secs(30))
            .with_reconnect();
        assert_eq!(builder.options, expected);
    }

    #[test]
    fn test_build_creates_unbound() {
        let connection = ConnectionBuilder::new().build().expect("build");
        assert_eq!(connection.state(), ConnectionState::Unbound);
        assert_eq!(connection.options().id_header, "x-id");
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let result = ConnectionBuilder::new().id_header("").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_builder_is_reusable() {
        let builder =
            ConnectionBuilder::new().router(|_: IncomingRequest, _: OutgoingResponse| {});
        let first = builder.clone().build().expect("first");
        let second = builder.build().expect("second");
        assert_eq!(first.state(), second.state());
    }
}
