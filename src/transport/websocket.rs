//! WebSocket transport over tokio-tungstenite.
//!
//! The stream is split into two tasks so that a slow consumer of incoming
//! messages never stalls outgoing writes:
//!
//! - **reader**: forwards text/binary/close messages as [`TransportEvent`]s.
//! - **writer**: owns the sink and executes send/ping/close commands in order,
//!   acknowledging each send once the frame is flushed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{
    EVENT_CHANNEL_CAPACITY, Payload, PeerInfo, Transport, TransportEvent, TransportEvents,
    close_code,
};

// ============================================================================
// WriterCommand
// ============================================================================

/// Commands for the writer task.
enum WriterCommand {
    /// Send a message and acknowledge once flushed.
    Send {
        message: Message,
        done_tx: oneshot::Sender<Result<()>>,
    },
    /// Send a ping.
    Ping,
    /// Send a close frame and stop.
    Close {
        code: u16,
        reason: String,
        done_tx: oneshot::Sender<Result<()>>,
    },
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over a tokio-tungstenite [`WebSocketStream`].
///
/// # Example
///
/// ```ignore
/// let (transport, events) = WebSocketTransport::connect("ws://127.0.0.1:9000").await?;
/// let connection = Connection::builder().build()?;
/// connection.bind(transport, events)?;
/// ```
pub struct WebSocketTransport {
    /// Channel to the writer task.
    command_tx: mpsc::UnboundedSender<WriterCommand>,
    /// Readiness flag shared with both tasks.
    open: Arc<AtomicBool>,
    /// Remote end information.
    peer: PeerInfo,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("open", &self.is_open())
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Wraps an established WebSocket stream.
    ///
    /// Spawns the reader and writer tasks internally.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>, peer: PeerInfo) -> (Arc<Self>, TransportEvents)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (ws_write, ws_read) = ws_stream.split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::run_writer(ws_write, command_rx, Arc::clone(&open)));
        tokio::spawn(Self::run_reader(ws_read, event_tx, Arc::clone(&open)));

        let transport = Arc::new(Self {
            command_tx,
            open,
            peer,
        });

        (transport, event_rx)
    }

    /// Connects to a WebSocket server.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL is malformed
    /// - [`Error::Connection`] if the handshake fails
    pub async fn connect(url: &str) -> Result<(Arc<Self>, TransportEvents)> {
        let parsed = Url::parse(url)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        debug!(%url, "WebSocket client connected");

        let peer = PeerInfo {
            url: Some(parsed),
            ..PeerInfo::default()
        };

        Ok(Self::from_stream(ws_stream, peer))
    }

    /// Connects to a WebSocket server, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake does not finish in time
    /// - Everything [`connect`](Self::connect) returns
    pub async fn connect_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<(Arc<Self>, TransportEvents)> {
        match tokio::time::timeout(timeout, Self::connect(url)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(%url, timeout_ms, "WebSocket connect timed out");
                Err(Error::connection_timeout(timeout_ms))
            }
        }
    }

    /// Writer task: executes commands against the sink in order.
    async fn run_writer<S>(
        mut ws_write: SplitSink<WebSocketStream<S>, Message>,
        mut command_rx: mpsc::UnboundedReceiver<WriterCommand>,
        open: Arc<AtomicBool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(command) = command_rx.recv().await {
            match command {
                WriterCommand::Send { message, done_tx } => {
                    let result = ws_write.send(message).await.map_err(|e| {
                        open.store(false, Ordering::Release);
                        Error::from(e)
                    });
                    let _ = done_tx.send(result);
                }

                WriterCommand::Ping => {
                    if let Err(e) = ws_write.send(Message::Ping(Default::default())).await {
                        warn!(error = %e, "Failed to send ping");
                    }
                }

                WriterCommand::Close {
                    code,
                    reason,
                    done_tx,
                } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let result = ws_write
                        .send(Message::Close(Some(frame)))
                        .await
                        .map_err(Error::from);
                    let _ = done_tx.send(result);
                    break;
                }
            }
        }

        open.store(false, Ordering::Release);
        debug!("WebSocket writer terminated");
    }

    /// Reader task: forwards incoming messages as ordered events.
    async fn run_reader<S>(
        mut ws_read: SplitStream<WebSocketStream<S>>,
        event_tx: mpsc::Sender<TransportEvent>,
        open: Arc<AtomicBool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let closed = loop {
            let event = match ws_read.next().await {
                Some(Ok(Message::Text(text))) => {
                    TransportEvent::Message(Payload::Text(text.as_str().to_owned()))
                }

                Some(Ok(Message::Binary(bytes))) => {
                    TransportEvent::Message(Payload::Binary(bytes.to_vec()))
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by remote");
                    break match frame {
                        Some(frame) => TransportEvent::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => TransportEvent::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    };
                }

                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    break TransportEvent::Closed {
                        code: Some(close_code::ABNORMAL),
                        reason: e.to_string(),
                    };
                }

                None => {
                    debug!("WebSocket stream ended");
                    break TransportEvent::Closed {
                        code: Some(close_code::ABNORMAL),
                        reason: String::new(),
                    };
                }

                // Ping, Pong and raw frames are handled by tungstenite
                Some(Ok(_)) => continue,
            };

            trace!("WebSocket message received");
            if event_tx.send(event).await.is_err() {
                debug!("Event receiver dropped");
                return;
            }
        };

        open.store(false, Ordering::Release);
        let _ = event_tx.send(closed).await;
        debug!("WebSocket reader terminated");
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SocketNotOpen);
        }

        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        };

        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(WriterCommand::Send { message, done_tx })
            .map_err(|_| Error::SocketNotOpen)?;

        done_rx.await?
    }

    async fn ping(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SocketNotOpen);
        }

        self.command_tx
            .send(WriterCommand::Ping)
            .map_err(|_| Error::SocketNotOpen)
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(WriterCommand::Close {
                code,
                reason: reason.to_string(),
                done_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        done_rx.await?
    }

    fn peer(&self) -> PeerInfo {
        self.peer.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
