//! Connection: framing, correlation and lifecycle for one transport.
//!
//! # Lifecycle
//!
//! ```text
//!            bind                 transport closed / close()
//! Unbound ─────────► Open ──────────────────────────────────► Closed
//!    ▲                │ ▲
//!    │ transport lost │ │ bind (rebind)
//!    └────────────────┘ └── Rebinding
//!      (reconnect mode)
//! ```
//!
//! Every transition away from `Open` aborts all in-flight exchanges;
//! correlation state never survives a transport replacement.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Connection`] handle and event loop |
//! | `builder` | [`ConnectionBuilder`] |
//! | `options` | [`ConnectionOptions`] |
//! | `event` | States, events and remote address |

// ============================================================================
// Submodules
// ============================================================================

/// Connection builder.
pub mod builder;

/// Connection handle, lifecycle and event loop.
pub mod core;

/// Lifecycle types.
pub mod event;

/// Connection options.
pub mod options;

mod dispatch;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use core::Connection;
pub use event::{ConnectionEvent, ConnectionState, EventHandler, ReconnectEvent, RemoteAddress};
pub use options::{ConnectionOptions, DEFAULT_CHUNK_CAPACITY};
