//! Connection lifecycle types.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ConnectionState`] | `Unbound → Open → Closed`, with `Rebinding` while a transport is replaced |
//! | [`ConnectionEvent`] | Observed through [`Connection::on_event`](super::Connection::on_event) |
//! | [`ReconnectEvent`] | Fed by a reconnection collaborator |
//! | [`RemoteAddress`] | Best-known peer address |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::protocol::Headers;
use crate::transport::{PeerInfo, Transport, TransportEvents};

// ============================================================================
// Constants
// ============================================================================

/// Upgrade header carrying the client address behind a proxy.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Upgrade header carrying the client port behind a proxy.
pub const REAL_PORT_HEADER: &str = "x-real-port";

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport attached.
    Unbound,
    /// A transport is attached and frames flow.
    Open,
    /// A live transport is being replaced.
    Rebinding,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while a transport is attached.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once the connection is terminal.
    #[inline]
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Open => "open",
            Self::Rebinding => "rebinding",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Event emitted by a connection to registered handlers.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A transport was bound.
    Open,

    /// The transport was lost in reconnect mode. In-flight exchanges were aborted.
    Unbound {
        /// Close code reported by the transport.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// The connection closed. In-flight exchanges were aborted.
    Close {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// A connection-level error. Fatal errors are followed by `Close`.
    Error(Error),
}

/// Event handler callback type.
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

// ============================================================================
// ReconnectEvent
// ============================================================================

/// Event fed to [`Connection::attach_reconnector`](super::Connection::attach_reconnector).
pub enum ReconnectEvent {
    /// A fresh transport is available; rebind to it.
    Open {
        /// Write side.
        transport: Arc<dyn Transport>,
        /// Ordered events.
        events: TransportEvents,
    },
    /// The current transport is gone; unbind and wait for the next `Open`.
    Close {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

impl fmt::Debug for ReconnectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { .. } => f.debug_struct("Open").finish_non_exhaustive(),
            Self::Close { code, reason } => f
                .debug_struct("Close")
                .field("code", code)
                .field("reason", reason)
                .finish(),
        }
    }
}

// ============================================================================
// RemoteAddress
// ============================================================================

/// Best-known address of the remote end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAddress {
    /// Host or IP.
    pub address: Option<String>,
    /// Port.
    pub port: Option<u16>,
}

impl RemoteAddress {
    /// Derives the address from what the transport knows.
    ///
    /// Proxy headers on the upgrade request win, then the socket peer address,
    /// then the URL the transport connected to. Address and port always come
    /// from the same source.
    #[must_use]
    pub fn from_peer(peer: &PeerInfo) -> Self {
        let upgrade = peer.upgrade_headers.as_ref();
        if let Some(real_ip) = upgrade.and_then(|headers| headers.get_str(REAL_IP_HEADER)) {
            return Self {
                address: Some(real_ip.to_owned()),
                port: upgrade.and_then(real_port),
            };
        }

        if let Some(addr) = peer.remote_addr {
            return Self {
                address: Some(addr.ip().to_string()),
                port: Some(addr.port()),
            };
        }

        peer.url
            .as_ref()
            .map(|url| Self {
                address: url.host_str().map(str::to_owned),
                port: url.port_or_known_default(),
            })
            .unwrap_or_default()
    }

    /// Returns `true` if nothing is known.
    #[inline]
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.address.is_none() && self.port.is_none()
    }
}

fn real_port(headers: &Headers) -> Option<u16> {
    match headers.get(REAL_PORT_HEADER)? {
        Value::Number(n) => n.as_u64().and_then(|port| u16::try_from(port).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use url::Url;

    fn socket(addr: &str) -> Option<SocketAddr> {
        addr.parse().ok()
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Rebinding.is_open());
        assert!(ConnectionState::Closed.is_closed());
        assert_eq!(ConnectionState::Unbound.to_string(), "unbound");
    }

    #[test]
    fn test_address_from_socket() {
        let peer = PeerInfo {
            remote_addr: socket("10.0.0.7:4100"),
            ..PeerInfo::default()
        };
        let address = RemoteAddress::from_peer(&peer);
        assert_eq!(address.address.as_deref(), Some("10.0.0.7"));
        assert_eq!(address.port, Some(4100));
    }

    #[test]
    fn test_proxy_headers_win() {
        let headers: Headers = [
            ("X-Real-IP", Value::from("203.0.113.9")),
            ("x-real-port", Value::from("8443")),
        ]
        .into_iter()
        .collect();
        let peer = PeerInfo {
            remote_addr: socket("127.0.0.1:5000"),
            upgrade_headers: Some(headers),
            ..PeerInfo::default()
        };
        let address = RemoteAddress::from_peer(&peer);
        assert_eq!(address.address.as_deref(), Some("203.0.113.9"));
        assert_eq!(address.port, Some(8443));
    }

    #[test]
    fn test_proxy_ip_without_port() {
        let headers: Headers = [("x-real-ip", Value::from("203.0.113.9"))]
            .into_iter()
            .collect();
        let peer = PeerInfo {
            remote_addr: socket("127.0.0.1:5000"),
            upgrade_headers: Some(headers),
            ..PeerInfo::default()
        };
        let address = RemoteAddress::from_peer(&peer);
        assert_eq!(address.address.as_deref(), Some("203.0.113.9"));
        assert_eq!(address.port, None);
    }

    #[test]
    fn test_address_from_url_default_port() {
        let peer = PeerInfo {
            url: Url::parse("wss://example.com/socket").ok(),
            ..PeerInfo::default()
        };
        let address = RemoteAddress::from_peer(&peer);
        assert_eq!(address.address.as_deref(), Some("example.com"));
        assert_eq!(address.port, Some(443));
    }

    #[test]
    fn test_unknown_address() {
        assert!(RemoteAddress::from_peer(&PeerInfo::default()).is_unknown());
    }
}
