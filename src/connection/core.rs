//! Connection handle, lifecycle and event loop.
//!
//! A [`Connection`] is the single authority for one transport's framing,
//! correlation and lifecycle. Binding a transport spawns an event loop task
//! that drains the transport's events strictly in arrival order:
//!
//! ```text
//! TransportEvent::Message ─► decode ─► validate ─► dictionary (inward) ─► dispatch
//! TransportEvent::Error   ─► ConnectionEvent::Error
//! TransportEvent::Closed  ─► Unbound (reconnect mode) or Closed
//! ```
//!
//! Every bind gets a new generation number. A loop whose generation is no
//! longer current stops at its next event, so a replaced transport can never
//! feed frames into the new binding.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::exchange::table::{CorrelationTable, ExchangeEntry, HalfState};
use crate::exchange::{ExchangeSignal, Half, OutgoingExchange, OutgoingRequest, Outcome, TableKind};
use crate::protocol::{Codec, Frame, Headers, Method, RequestLine};
use crate::router::Router;
use crate::transport::{Payload, Transport, TransportEvent, TransportEvents, close_code};

use super::builder::ConnectionBuilder;
use super::dispatch;
use super::event::{
    ConnectionEvent, ConnectionState, EventHandler, ReconnectEvent, RemoteAddress,
};
use super::options::ConnectionOptions;

// ============================================================================
// Binding
// ============================================================================

/// The currently attached transport and its event loop.
struct Binding {
    transport: Arc<dyn Transport>,
    generation: u64,
    reader: JoinHandle<()>,
}

impl Binding {
    /// Stops the event loop unless the caller is running inside it.
    fn stop_reader(&self) {
        if tokio::task::try_id() != Some(self.reader.id()) {
            self.reader.abort();
        }
    }
}

// ============================================================================
// ConnectionInner
// ============================================================================

/// Shared connection state.
///
/// Held strongly by [`Connection`] handles and the event loop, weakly by
/// exchange streams and the keepalive task.
pub(crate) struct ConnectionInner {
    /// Immutable configuration.
    pub(crate) options: ConnectionOptions,
    /// Payload codec.
    codec: Arc<dyn Codec>,
    /// Receives every new inbound exchange.
    router: RwLock<Option<Arc<dyn Router>>>,
    /// Lifecycle state.
    state: Mutex<ConnectionState>,
    /// Attached transport.
    binding: Mutex<Option<Binding>>,
    /// Last issued binding generation.
    generation: AtomicU64,
    /// Last issued outgoing correlation id.
    next_id: AtomicU64,
    /// Transport loss unbinds instead of closing.
    reconnect: AtomicBool,
    /// Exchanges the peer originated.
    pub(crate) inbound: CorrelationTable,
    /// Exchanges this side originated.
    pub(crate) outbound: CorrelationTable,
    /// Keepalive task.
    ping: Mutex<Option<JoinHandle<()>>>,
    /// Registered event handlers.
    handlers: RwLock<Vec<EventHandler>>,
    /// Memoized remote address, reset on bind.
    address: Mutex<Option<RemoteAddress>>,
    /// Authenticated principal.
    user: RwLock<Option<Value>>,
}

// ============================================================================
// ConnectionInner - Accessors
// ============================================================================

impl ConnectionInner {
    fn new(
        options: ConnectionOptions,
        codec: Arc<dyn Codec>,
        router: Option<Arc<dyn Router>>,
    ) -> Self {
        let reconnect = options.reconnect;

        Self {
            options,
            codec,
            router: RwLock::new(router),
            state: Mutex::new(ConnectionState::Unbound),
            binding: Mutex::new(None),
            generation: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            reconnect: AtomicBool::new(reconnect),
            inbound: CorrelationTable::new(TableKind::Inbound),
            outbound: CorrelationTable::new(TableKind::Outbound),
            ping: Mutex::new(None),
            handlers: RwLock::new(Vec::new()),
            address: Mutex::new(None),
            user: RwLock::new(None),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    #[inline]
    pub(crate) fn router(&self) -> Option<Arc<dyn Router>> {
        self.router.read().clone()
    }

    #[inline]
    pub(crate) fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| Arc::clone(&binding.transport))
    }

    pub(crate) fn upgrade_headers(&self) -> Option<Headers> {
        self.transport()
            .and_then(|transport| transport.peer().upgrade_headers)
    }

    pub(crate) fn table(&self, kind: TableKind) -> &CorrelationTable {
        match kind {
            TableKind::Inbound => &self.inbound,
            TableKind::Outbound => &self.outbound,
        }
    }

    /// Releases one half of an exchange. Idempotent.
    pub(crate) fn release(&self, kind: TableKind, id: u64, half: Half, outcome: Outcome) -> bool {
        self.table(kind).release(id, half, outcome)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.binding
            .lock()
            .as_ref()
            .is_some_and(|binding| binding.generation == generation)
    }

    /// Takes the binding, only if it still belongs to `generation` when given.
    fn take_binding(&self, generation: Option<u64>) -> Option<Binding> {
        let mut binding = self.binding.lock();
        match generation {
            Some(generation)
                if binding
                    .as_ref()
                    .is_none_or(|current| current.generation != generation) =>
            {
                None
            }
            _ => binding.take(),
        }
    }

    pub(crate) fn emit(&self, event: &ConnectionEvent) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            handler(event);
        }
    }
}

// ============================================================================
// ConnectionInner - Sending
// ============================================================================

impl ConnectionInner {
    /// Delivers an encoded payload without buffering.
    pub(crate) async fn send(&self, payload: Payload) -> Result<()> {
        let Some(transport) = self.transport() else {
            debug!("Send without transport");
            return Err(Error::SocketNotOpen);
        };

        if !transport.is_open() {
            debug!("Send while transport not open");
            return Err(Error::SocketNotOpen);
        }

        transport.send(payload).await
    }

    /// Translates, encodes and sends one frame.
    pub(crate) async fn send_frame(&self, frame: Frame) -> Result<()> {
        let frame = Frame {
            headers: self.options.dictionary.to_wire(&frame.headers),
            ..frame
        };

        let payload = self.codec.encode(&frame)?;
        trace!(identifier = ?frame.identifier, len = payload.len(), "Frame sent");

        self.send(payload).await
    }
}

// ============================================================================
// ConnectionInner - Lifecycle
// ============================================================================

impl ConnectionInner {
    fn bind(self: &Arc<Self>, transport: Arc<dyn Transport>, events: TransportEvents) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Closed => return Err(Error::ConnectionClosed),
                ConnectionState::Open => *state = ConnectionState::Rebinding,
                ConnectionState::Unbound | ConnectionState::Rebinding => {}
            }
        }

        let aborted = self.abort_exchanges();
        if aborted > 0 {
            debug!(aborted, "Exchanges aborted by rebind");
        }
        *self.address.lock() = None;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = {
            let mut binding = self.binding.lock();
            let reader = tokio::spawn(run_event_loop(Arc::clone(self), generation, events));
            binding.replace(Binding {
                transport,
                generation,
                reader,
            })
        };

        if let Some(previous) = previous {
            previous.stop_reader();
            if previous.transport.is_open() {
                tokio::spawn(async move {
                    let _ = previous
                        .transport
                        .close(close_code::GOING_AWAY, "transport replaced")
                        .await;
                });
            }
        }

        {
            let mut state = self.state.lock();
            if state.is_closed() {
                drop(state);
                if let Some(binding) = self.take_binding(Some(generation)) {
                    binding.stop_reader();
                }
                return Err(Error::ConnectionClosed);
            }
            *state = ConnectionState::Open;
        }

        if let Some(interval) = self.options.ping_interval {
            self.ping(interval)?;
        }

        info!(generation, "Transport bound");
        self.emit(&ConnectionEvent::Open);
        Ok(())
    }

    /// Closes the transport, aborts every exchange and moves to `Closed`.
    pub(crate) async fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            *state = ConnectionState::Closed;
        }

        let binding = self.take_binding(None);
        let aborted = self.abort_exchanges();
        self.stop_ping();

        info!(code, reason, aborted, "Connection closed");

        if let Some(binding) = binding {
            if let Err(e) = binding.transport.close(code, reason).await {
                debug!(error = %e, "Transport close failed");
            }
            binding.stop_reader();
        }

        self.emit(&ConnectionEvent::Close {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Detaches the transport, aborts every exchange and moves to `Unbound`.
    async fn unbind(&self, code: Option<u16>, reason: &str) {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            *state = ConnectionState::Unbound;
        }

        let binding = self.take_binding(None);
        let aborted = self.abort_exchanges();
        self.stop_ping();

        info!(?code, reason, aborted, "Connection unbound");

        if let Some(binding) = binding {
            if binding.transport.is_open() {
                let code = code.unwrap_or(close_code::GOING_AWAY);
                if let Err(e) = binding.transport.close(code, reason).await {
                    debug!(error = %e, "Transport close failed");
                }
            }
            binding.stop_reader();
        }

        self.emit(&ConnectionEvent::Unbound {
            code,
            reason: reason.to_string(),
        });
    }

    /// Handles the end of a binding's event stream.
    fn transport_closed(&self, generation: u64, code: Option<u16>, reason: String) {
        let Some(binding) = self.take_binding(Some(generation)) else {
            return;
        };

        let reconnect = self.reconnect.load(Ordering::Acquire);
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return;
            }
            *state = if reconnect {
                ConnectionState::Unbound
            } else {
                ConnectionState::Closed
            };
        }

        let aborted = self.abort_exchanges();
        self.stop_ping();
        drop(binding);

        if reconnect {
            info!(?code, %reason, aborted, "Transport lost, waiting for rebind");
            self.emit(&ConnectionEvent::Unbound { code, reason });
        } else {
            info!(?code, %reason, aborted, "Transport closed");
            self.emit(&ConnectionEvent::Close { code, reason });
        }
    }

    /// Surfaces a connection-fatal error and closes with its close code.
    pub(crate) async fn fail(&self, error: Error) {
        let code = error.close_code().unwrap_or(close_code::PROTOCOL_ERROR);
        let reason = error.to_string();

        warn!(error = %error, code, "Connection-fatal error");
        self.emit(&ConnectionEvent::Error(error));
        self.close(code, &reason).await;
    }

    /// Drains both tables, aborting every exchange.
    fn abort_exchanges(&self) -> usize {
        let mut aborted = 0;
        for table in [&self.inbound, &self.outbound] {
            for (id, entry) in table.drain() {
                trace!(id, "Exchange aborted");
                entry.abort();
                aborted += 1;
            }
        }
        aborted
    }

    fn ping(self: &Arc<Self>, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::config("Ping interval must be greater than zero"));
        }

        let connection = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;

                let Some(transport) = connection.upgrade().map(|inner| inner.transport()) else {
                    break;
                };

                match transport {
                    Some(transport) if transport.is_open() => {
                        if let Err(e) = transport.ping().await {
                            debug!(error = %e, "Keepalive failed");
                        }
                    }
                    _ => trace!("Keepalive skipped, transport not open"),
                }
            }
        });

        if let Some(previous) = self.ping.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop_ping(&self) {
        if let Some(task) = self.ping.lock().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Drains one binding's transport events in arrival order.
async fn run_event_loop(inner: Arc<ConnectionInner>, generation: u64, mut events: TransportEvents) {
    debug!(generation, "Event loop started");

    let (code, reason) = loop {
        let Some(event) = events.recv().await else {
            break (Some(close_code::ABNORMAL), String::new());
        };

        if !inner.is_current(generation) {
            debug!(generation, "Event loop superseded");
            return;
        }

        match event {
            TransportEvent::Message(payload) => dispatch::handle_message(&inner, payload).await,

            TransportEvent::Error(message) => {
                warn!(%message, "Transport error");
                inner.emit(&ConnectionEvent::Error(Error::transport(message)));
            }

            TransportEvent::Closed { code, reason } => break (code, reason),
        }
    };

    inner.transport_closed(generation, code, reason);
    debug!(generation, "Event loop terminated");
}

// ============================================================================
// Connection
// ============================================================================

/// Multiplexed request/response exchanges over one transport.
///
/// Cheap to clone; all clones share the same state.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::builder().build()?;
/// let (transport, events) = WebSocketTransport::connect("ws://127.0.0.1:9000").await?;
/// connection.bind(transport, events)?;
///
/// let mut request = connection.request();
/// request.set_method(Method::Post).set_path("/echo");
/// request.end_with("hello").await?;
///
/// let mut response = request.response().await?;
/// assert_eq!(response.status(), 200);
/// let body = response.read_to_end().await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("inbound", &self.inbound_count())
            .field("outbound", &self.outbound_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a connection builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Creates an unbound connection.
    pub(crate) fn new(
        options: ConnectionOptions,
        codec: Arc<dyn Codec>,
        router: Option<Arc<dyn Router>>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner::new(options, codec, router)),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Attaches a transport and starts its event loop.
    ///
    /// Binding over a live transport is a rebind: every in-flight exchange is
    /// aborted first and the old transport is closed with `1001`. Installs the
    /// keepalive when [`ConnectionOptions::ping_interval`] is set.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    pub fn bind(&self, transport: Arc<dyn Transport>, events: TransportEvents) -> Result<()> {
        self.inner.bind(transport, events)
    }

    /// Closes the connection.
    ///
    /// Closes the transport if present, aborts every inbound and outbound
    /// exchange, clears the keepalive and emits [`ConnectionEvent::Close`].
    /// Closing twice is a no-op.
    pub async fn close(&self, code: u16, reason: &str) {
        self.inner.close(code, reason).await;
    }

    /// Detaches the transport without closing the connection.
    ///
    /// Aborts every exchange and emits [`ConnectionEvent::Unbound`]. A later
    /// [`bind`](Self::bind) reopens the connection.
    pub async fn unbind(&self, code: Option<u16>, reason: &str) {
        self.inner.unbind(code, reason).await;
    }

    /// Follows a reconnection collaborator.
    ///
    /// Every `Open` rebinds to the new transport and every `Close` unbinds.
    /// Transport loss no longer closes the connection once attached. The task
    /// ends when the channel closes or the connection is closed.
    pub fn attach_reconnector(&self, mut reconnects: mpsc::Receiver<ReconnectEvent>) -> JoinHandle<()> {
        self.inner.reconnect.store(true, Ordering::Release);
        let connection = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(event) = reconnects.recv().await {
                let Some(inner) = connection.upgrade() else {
                    break;
                };

                match event {
                    ReconnectEvent::Open { transport, events } => {
                        if let Err(e) = inner.bind(transport, events) {
                            warn!(error = %e, "Rebind failed");
                        }
                    }
                    ReconnectEvent::Close { code, reason } => inner.unbind(code, &reason).await,
                }

                if inner.state().is_closed() {
                    break;
                }
            }

            debug!("Reconnector detached");
        })
    }

    /// (Re)installs the keepalive timer.
    ///
    /// Pings are only sent while the transport reports open. Replaces any
    /// previous timer.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `interval` is zero
    pub fn ping(&self, interval: Duration) -> Result<()> {
        self.inner.ping(interval)
    }
}

// ============================================================================
// Connection - Exchanges
// ============================================================================

impl Connection {
    /// Starts an outgoing exchange.
    ///
    /// Allocates the next correlation id and registers it. Nothing is sent
    /// until the first `write` or `end`. On a closed connection the returned
    /// stream is already aborted.
    #[must_use]
    pub fn request(&self) -> OutgoingRequest {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let signal = ExchangeSignal::new();
        let (head_tx, head_rx) = oneshot::channel();

        if inner.state().is_closed() {
            signal.abort();
        } else {
            inner.outbound.insert(
                id,
                ExchangeEntry {
                    request: HalfState::outgoing(Arc::clone(&signal)),
                    response: HalfState::incoming(ExchangeSignal::new(), None),
                    response_head: Some(head_tx),
                },
            );
        }

        let mut headers = Headers::new();
        headers.set(inner.options.id_header.clone(), id);

        trace!(id, "Outgoing exchange created");
        OutgoingExchange::new(
            id,
            RequestLine::new(Method::Get, "/"),
            headers,
            Arc::downgrade(inner),
            signal,
        )
        .with_response(head_rx)
    }

    /// Delivers an already encoded payload.
    ///
    /// Nothing is buffered or retried.
    ///
    /// # Errors
    ///
    /// - [`Error::SocketNotOpen`] if no transport is attached or it is not open;
    ///   the transport is not written to
    /// - Transport-specific errors if the write fails
    pub async fn send(&self, payload: Payload) -> Result<()> {
        self.inner.send(payload).await
    }

    /// Installs the router receiving new inbound exchanges.
    pub fn set_router(&self, router: impl Router + 'static) {
        *self.inner.router.write() = Some(Arc::new(router));
    }

    /// Returns the number of live inbound exchanges.
    #[inline]
    #[must_use]
    pub fn inbound_count(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Returns the number of live outbound exchanges.
    #[inline]
    #[must_use]
    pub fn outbound_count(&self) -> usize {
        self.inner.outbound.len()
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Registers an event handler.
    ///
    /// Handlers run synchronously on the task that produced the event.
    pub fn on_event(&self, handler: impl Fn(&ConnectionEvent) + Send + Sync + 'static) {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` while a transport is bound.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns the best-known remote address.
    ///
    /// Memoized per binding. Unknown while unbound.
    #[must_use]
    pub fn address(&self) -> RemoteAddress {
        let mut memo = self.inner.address.lock();
        if let Some(address) = memo.as_ref() {
            return address.clone();
        }

        let Some(transport) = self.inner.transport() else {
            return RemoteAddress::default();
        };

        let address = RemoteAddress::from_peer(&transport.peer());
        *memo = Some(address.clone());
        address
    }

    /// Returns the upgrade request headers of the bound transport.
    #[must_use]
    pub fn upgrade_headers(&self) -> Option<Headers> {
        self.inner.upgrade_headers()
    }

    /// Attaches an authenticated principal.
    pub fn set_user(&self, user: Value) {
        *self.inner.user.write() = Some(user);
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.inner.user.read().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
