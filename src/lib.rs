//! ws-exchange - Multiplexed request/response exchanges over one WebSocket.
//!
//! This library runs many concurrent, HTTP-style exchanges over a single
//! message-framed transport. Every frame is a JSON triple
//! `[identifier, headers, body]` tagged with a correlation id, and either
//! side may originate requests.
//!
//! # Architecture
//!
//! The engine is symmetric:
//!
//! - **Originator**: [`Connection::request`] writes an [`OutgoingRequest`]
//!   and reads the matching [`IncomingResponse`]
//! - **Peer**: the [`Router`] receives an [`IncomingRequest`] and writes the
//!   matching [`OutgoingResponse`]
//!
//! Key design principles:
//!
//! - One ordered event loop per transport decodes, validates and dispatches frames
//! - Bodies stream chunk by chunk with bounded buffering per exchange
//! - Frame or codec violations close the whole connection; send failures stay local
//! - A transport can be replaced (reconnect mode); in-flight exchanges abort
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_exchange::{Connection, Method, Result, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (transport, events) = WebSocketTransport::connect("ws://127.0.0.1:8080").await?;
//!     let connection = Connection::builder().build()?;
//!     connection.bind(transport, events)?;
//!
//!     let mut request = connection.request();
//!     request.set_method(Method::Post).set_path("/users");
//!     request.end_with(serde_json::json!({"name": "ada"})).await?;
//!
//!     let mut response = request.response().await?;
//!     println!("status {}", response.status());
//!     for chunk in response.read_to_end().await? {
//!         println!("{chunk}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`] handle, builder, options and lifecycle |
//! | [`exchange`] | Incoming and outgoing exchange streams |
//! | [`router`] | [`Router`] trait for inbound exchanges |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Frame model, validation, header dictionary, codec |
//! | [`transport`] | Transport trait, WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Connection handle, builder and lifecycle.
///
/// Use [`Connection::builder()`] to create a configured connection.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Exchange streams.
///
/// - [`OutgoingRequest`] / [`OutgoingResponse`] - write side
/// - [`IncomingRequest`] / [`IncomingResponse`] - read side
pub mod exchange;

/// Wire protocol: frames, headers, validation and codecs.
pub mod protocol;

/// Inbound exchange routing.
pub mod router;

/// Transport layer.
///
/// Transport trait plus WebSocket and in-memory implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionEvent, ConnectionOptions, ConnectionState,
    ReconnectEvent, RemoteAddress,
};

// Error types
pub use error::{Error, Result};

// Exchange types
pub use exchange::{
    IncomingRequest, IncomingResponse, Outcome, OutgoingRequest, OutgoingResponse,
};

// Protocol types
pub use protocol::{Codec, Continuation, Frame, HeaderDictionary, Headers, JsonCodec, Method};

// Router
pub use router::Router;

// Transport types
pub use transport::{
    Connector, ConnectorEvent, MemoryTransport, Payload, PeerInfo, Transport, TransportEvent,
    TransportEvents, WebSocketTransport, close_code,
};
