//! Transport layer.
//!
//! A transport is an ordered, message-framed, bidirectional link (a WebSocket
//! in practice). The connection consumes it through two halves:
//!
//! - [`Transport`]: the write side, `send`/`ping`/`close` plus a readiness flag.
//! - [`TransportEvents`]: an ordered channel of [`TransportEvent`]s
//!   (message, error, close) produced by the transport's reader.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   TransportEvent (ordered)   ┌──────────────────┐
//! │  Transport       │ ───────────────────────────► │  Connection      │
//! │  reader task     │                              │  event loop      │
//! │                  │ ◄─────────────────────────── │                  │
//! │  writer task     │   send / ping / close        │  exchange streams│
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite transport (client and server side) |
//! | `memory` | In-process loopback transport pair |
//! | `connector` | WebSocket accept loop creating connections |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket accept loop creating connections.
pub mod connector;

/// In-process loopback transport pair.
pub mod memory;

/// tokio-tungstenite transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::protocol::Headers;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{Connector, ConnectorEvent};
pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the ordered event channel between a transport and its connection.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transport-level close codes used by the exchange layer.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away.
    pub const GOING_AWAY: u16 = 1001;
    /// A frame failed structural or identifier validation.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// A payload could not be decoded.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Link lost without a close handshake.
    pub const ABNORMAL: u16 = 1006;
}

// ============================================================================
// Types
// ============================================================================

/// Receiving half of a transport.
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// One encoded transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete message arrived.
    Message(Payload),
    /// The transport reported an error. Usually followed by `Closed`.
    Error(String),
    /// The transport closed.
    Closed {
        /// Close code, if one was received.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// What a transport knows about its remote end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerInfo {
    /// Remote socket address (server side).
    pub remote_addr: Option<SocketAddr>,
    /// URL the transport connected to (client side).
    pub url: Option<Url>,
    /// Headers of the upgrade request (server side).
    pub upgrade_headers: Option<Headers>,
}

// ============================================================================
// Transport
// ============================================================================

/// Write side of an ordered, message-framed link.
///
/// `send` resolves once the transport has accepted the payload, which is what
/// paces outgoing exchange streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns `true` while the transport can accept writes.
    fn is_open(&self) -> bool;

    /// Sends one payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SocketNotOpen`](crate::Error::SocketNotOpen) if the
    /// link is gone, or a transport-specific error if the write fails.
    async fn send(&self, payload: Payload) -> Result<()>;

    /// Sends a transport-level keepalive.
    ///
    /// # Errors
    ///
    /// Returns an error if the keepalive cannot be written.
    async fn ping(&self) -> Result<()>;

    /// Closes the link with a close code and reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the close cannot be written.
    async fn close(&self, code: u16, reason: &str) -> Result<()>;

    /// Returns what is known about the remote end.
    fn peer(&self) -> PeerInfo {
        PeerInfo::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
