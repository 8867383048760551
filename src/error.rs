//! Error types for ws-exchange.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_exchange::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     let mut request = connection.request();
//!     request.set_method(Method::Get).set_path("/users");
//!     request.end().await?;
//!     let response = request.response().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Scope |
//! |----------|----------|-------|
//! | Framing | [`Error::InvalidFrame`], [`Error::Protocol`] | Connection-fatal (close 1002) |
//! | Codec | [`Error::Codec`] | Connection-fatal on decode (close 1003), exchange-local on encode |
//! | Exchange | [`Error::SocketNotOpen`], [`Error::Aborted`], [`Error::StreamFinished`] | Exchange-local |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Transport`] | Connection-wide |
//! | Configuration | [`Error::Config`] | Construction time |
//! | External | [`Error::Io`], [`Error::WebSocket`], [`Error::Url`] | Varies |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::FrameError;
use crate::transport::close_code;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Decoded message is not a valid frame.
    ///
    /// Covers both structural errors (shape, headers) and identifier errors.
    /// The connection closes with [`close_code::PROTOCOL_ERROR`].
    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    /// Protocol violation other than frame shape.
    ///
    /// Returned when a well-formed frame breaks the exchange rules,
    /// e.g. a request frame without a correlation id.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Encoding or decoding a frame failed.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    // ========================================================================
    // Exchange Errors
    // ========================================================================
    /// Send attempted while the transport is not ready.
    ///
    /// Exchange-local: the connection stays open.
    #[error("Socket is not open")]
    SocketNotOpen,

    /// Exchange was torn down by a connection failure or explicit abort.
    #[error("Exchange {id} aborted")]
    Aborted {
        /// Correlation id of the aborted exchange.
        id: u64,
    },

    /// Write attempted after the stream was ended.
    #[error("Exchange {id} already finished")]
    StreamFinished {
        /// Correlation id of the finished exchange.
        id: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established or bound.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport reported an error event.
    #[error("Transport error: {message}")]
    Transport {
        /// Description reported by the transport.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options or the header dictionary are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    #[inline]
    pub fn aborted(id: u64) -> Self {
        Self::Aborted { id }
    }

    /// Creates a stream finished error.
    #[inline]
    pub fn stream_finished(id: u64) -> Self {
        Self::StreamFinished { id }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error terminates the whole connection.
    ///
    /// No further frame on the transport can be trusted after one of these.
    #[inline]
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrame(_) | Self::Protocol { .. } | Self::Codec { .. }
        )
    }

    /// Returns `true` if this error only affects a single exchange.
    #[inline]
    #[must_use]
    pub fn is_exchange_local(&self) -> bool {
        matches!(
            self,
            Self::SocketNotOpen | Self::Aborted { .. } | Self::StreamFinished { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is an abort signal.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Returns the transport close code used when this error closes a connection.
    #[inline]
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::InvalidFrame(_) | Self::Protocol { .. } => Some(close_code::PROTOCOL_ERROR),
            Self::Codec { .. } => Some(close_code::UNSUPPORTED_DATA),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
