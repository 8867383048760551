//! Exchange streams.
//!
//! An exchange is one request/response transaction identified by a
//! correlation id. Each side sees it as two streams:
//!
//! | Side | Writes | Reads |
//! |------|--------|-------|
//! | Originator | [`OutgoingRequest`] | [`IncomingResponse`] |
//! | Peer | [`OutgoingResponse`] | [`IncomingRequest`] |
//!
//! All four are one of two generic types, [`OutgoingExchange`] and
//! [`IncomingExchange`], parameterized by a [`FrameShape`] that decides
//! whether frames carry a request line or a status.
//!
//! The connection owns the correlation tables; streams only hold a weak
//! reference back to it and report completion through release calls.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `shape` | Frame shapes, halves and directions |
//! | `signal` | Per-half completion signal |
//! | `incoming` | Read side |
//! | `outgoing` | Write side |
//! | `table` | Correlation tables (crate-internal) |

// ============================================================================
// Submodules
// ============================================================================

/// Read side of an exchange half.
pub mod incoming;

/// Write side of an exchange half.
pub mod outgoing;

/// Frame shapes and directions.
pub mod shape;

/// Per-half completion signal.
pub mod signal;

pub(crate) mod table;

// ============================================================================
// Re-exports
// ============================================================================

pub use incoming::{IncomingExchange, IncomingRequest, IncomingResponse};
pub use outgoing::OutgoingExchange;
pub use shape::{Direction, FrameShape, Half, RequestShape, ResponseShape, TableKind};
pub use signal::{ExchangeSignal, Outcome};

// ============================================================================
// Type Aliases
// ============================================================================

/// Request written by a client.
pub type OutgoingRequest = OutgoingExchange<RequestShape>;

/// Response written by a server.
pub type OutgoingResponse = OutgoingExchange<ResponseShape>;
