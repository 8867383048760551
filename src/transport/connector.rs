//! WebSocket accept loop creating connections.
//!
//! A [`Connector`] binds a TCP listener, upgrades every accepted socket with
//! tokio-tungstenite and attaches a fresh [`Connection`] built from a shared
//! [`ConnectionBuilder`]. Live connections are tracked by a random id and
//! forgotten when they close.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                Connector                  │
//! │             (single port)                 │
//! │  ┌─────────────────────────────────────┐  │
//! │  │ 0b7c…  → Connection (socket A)      │  │
//! │  │ 91fe…  → Connection (socket B)      │  │
//! │  └─────────────────────────────────────┘  │
//! └───────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionBuilder, ConnectionEvent};
use crate::error::{Error, Result};
use crate::protocol::Headers;

use super::{PeerInfo, WebSocketTransport};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ConnectorEvent
// ============================================================================

/// Event emitted by a [`Connector`].
#[derive(Debug)]
pub enum ConnectorEvent {
    /// A socket was upgraded. Emitted before the transport is bound, so
    /// handlers can register on the connection before frames flow.
    Connected {
        /// Connector-local id.
        id: Uuid,
        /// The new connection.
        connection: Connection,
    },
    /// A tracked connection closed.
    Disconnected {
        /// Connector-local id.
        id: Uuid,
    },
}

/// Connector event handler callback type.
pub type ConnectorHandler = Arc<dyn Fn(&ConnectorEvent) + Send + Sync>;

// ============================================================================
// Connector
// ============================================================================

/// Accepts WebSocket clients and tracks one [`Connection`] per socket.
///
/// # Example
///
/// ```ignore
/// let builder = Connection::builder().router(handle);
/// let connector = Connector::bind(builder).await?;
/// println!("listening on {}", connector.ws_url());
/// ```
pub struct Connector {
    /// Bound address.
    local_addr: SocketAddr,
    /// Template for every accepted connection.
    builder: ConnectionBuilder,
    /// Live connections.
    connections: RwLock<FxHashMap<Uuid, Connection>>,
    /// Registered event handlers.
    handlers: RwLock<Vec<ConnectorHandler>>,
    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// Connector - Constructor
// ============================================================================

impl Connector {
    /// Binds to `localhost:0` (random available port) and starts accepting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the builder's options are invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(builder: ConnectionBuilder) -> Result<Arc<Self>> {
        Self::with_ip_port(builder, DEFAULT_BIND_IP, 0).await
    }

    /// Binds to a specific IP and port and starts accepting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the builder's options are invalid
    /// - [`Error::Io`] if binding fails
    pub async fn with_ip_port(builder: ConnectionBuilder, ip: IpAddr, port: u16) -> Result<Arc<Self>> {
        // Surface configuration errors before accepting anything.
        builder.clone().build()?;

        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        let connector = Arc::new(Self {
            local_addr,
            builder,
            connections: RwLock::new(FxHashMap::default()),
            handlers: RwLock::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });

        let accept = Arc::clone(&connector);
        tokio::spawn(async move {
            accept.accept_loop(listener).await;
        });

        info!(%local_addr, "Connector started");
        Ok(connector)
    }
}

// ============================================================================
// Connector - Public API
// ============================================================================

impl Connector {
    /// Returns the WebSocket URL clients connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns a live connection by id.
    #[must_use]
    pub fn connection(&self, id: Uuid) -> Option<Connection> {
        self.connections.read().get(&id).cloned()
    }

    /// Returns every live connection.
    #[must_use]
    pub fn connections(&self) -> Vec<(Uuid, Connection)> {
        self.connections
            .read()
            .iter()
            .map(|(id, connection)| (*id, connection.clone()))
            .collect()
    }

    /// Registers an event handler.
    pub fn on_event(&self, handler: impl Fn(&ConnectorEvent) + Send + Sync + 'static) {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Stops accepting and closes every live connection.
    pub async fn close(&self, code: u16, reason: &str) {
        info!(code, reason, "Connector shutting down");
        self.shutdown.store(true, Ordering::SeqCst);

        let connections: Vec<_> = self.connections.write().drain().collect();
        for (id, connection) in connections {
            connection.close(code, reason).await;
            debug!(%id, "Connection closed during shutdown");
        }

        info!("Connector shutdown complete");
    }

    fn emit(&self, event: &ConnectorEvent) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            handler(event);
        }
    }

    fn forget(&self, id: Uuid) {
        if self.connections.write().remove(&id).is_some() {
            debug!(%id, "Connection removed");
        }
        self.emit(&ConnectorEvent::Disconnected { id });
    }
}

// ============================================================================
// Connector - Accept Loop
// ============================================================================

impl Connector {
    /// Background task that accepts new sockets.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let connector = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = connector.handle_socket(stream, addr).await {
                            warn!(error = %e, %addr, "Socket handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one socket and attaches a connection to it.
    async fn handle_socket(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(%addr, "New TCP connection");

        let captured: Arc<Mutex<Option<Headers>>> = Arc::new(Mutex::new(None));
        let capture = Arc::clone(&captured);
        let callback = move |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            let headers: Headers = request
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect();
            *capture.lock() = Some(headers);
            Ok(response)
        };

        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let peer = PeerInfo {
            remote_addr: Some(addr),
            url: None,
            upgrade_headers: captured.lock().take(),
        };

        let connection = self.builder.clone().build()?;
        let id = Uuid::new_v4();

        let connector = Arc::downgrade(self);
        connection.on_event(move |event| {
            if matches!(event, ConnectionEvent::Close { .. })
                && let Some(connector) = connector.upgrade()
            {
                connector.forget(id);
            }
        });

        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.connections.write().insert(id, connection.clone());

        self.emit(&ConnectorEvent::Connected {
            id,
            connection: connection.clone(),
        });

        let (transport, events) = WebSocketTransport::from_stream(ws_stream, peer);
        connection.bind(transport, events)?;

        info!(%id, %addr, "WebSocket connection established");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::time::sleep;

    use crate::exchange::{IncomingRequest, OutgoingResponse};
    use crate::protocol::Method;
    use crate::transport::close_code;

    const WAIT: Duration = Duration::from_secs(5);

    fn echo(mut request: IncomingRequest, mut response: OutgoingResponse) {
        tokio::spawn(async move {
            let chunks = request.read_to_end().await?;
            for chunk in chunks {
                response.write(chunk).await?;
            }
            response.end().await
        });
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_connector_creation() {
        let connector = Connector::bind(Connection::builder()).await.expect("connector");
        assert!(connector.port() > 0);
        assert_eq!(connector.ws_url(), format!("ws://127.0.0.1:{}", connector.port()));
        assert_eq!(connector.connection_count(), 0);
        connector.close(close_code::GOING_AWAY, "test").await;
    }

    #[tokio::test]
    async fn test_invalid_builder_rejected() {
        let result = Connector::bind(Connection::builder().id_header("")).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_websocket_round_trip() -> anyhow::Result<()> {
        let connector = Connector::bind(Connection::builder().router(echo)).await?;

        let (transport, events) = WebSocketTransport::connect(&connector.ws_url()).await?;
        let client = Connection::builder().build()?;
        client.bind(transport, events)?;
        assert_eq!(client.address().port, Some(connector.port()));

        let mut request = client.request();
        request.set_method(Method::Post).set_path("/echo");
        request.write("hello").await?;
        request.end_with("world").await?;

        let mut response = request.response().await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.read_to_end().await?, vec![json!("hello"), json!("world")]);

        wait_for(|| connector.connection_count() == 1).await;
        let (_, server) = connector.connections().remove(0);
        assert_eq!(server.address().address.as_deref(), Some("127.0.0.1"));
        let upgrade = server.upgrade_headers().expect("upgrade headers");
        assert!(upgrade.contains("host"));

        client.close(close_code::NORMAL, "bye").await;
        wait_for(|| connector.connection_count() == 0).await;

        connector.close(close_code::GOING_AWAY, "test").await;
        Ok(())
    }

    #[tokio::test]
    async fn test_close_closes_connections() -> anyhow::Result<()> {
        let connector = Connector::bind(Connection::builder().router(echo)).await?;

        let (transport, events) = WebSocketTransport::connect(&connector.ws_url()).await?;
        let client = Connection::builder().build()?;
        client.bind(transport, events)?;

        wait_for(|| connector.connection_count() == 1).await;
        connector.close(close_code::GOING_AWAY, "shutdown").await;

        assert_eq!(connector.connection_count(), 0);
        wait_for(|| client.state().is_closed()).await;
        Ok(())
    }
}
