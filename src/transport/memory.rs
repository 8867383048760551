//! In-process loopback transport.
//!
//! [`MemoryTransport::pair`] returns two linked ends: a payload sent on one
//! end arrives as a [`TransportEvent::Message`] on the other. Both ends share
//! one readiness flag, so closing either end closes the link.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

use super::{EVENT_CHANNEL_CAPACITY, Payload, PeerInfo, Transport, TransportEvent, TransportEvents};

// ============================================================================
// MemoryTransport
// ============================================================================

/// One end of an in-process transport pair.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Shared readiness flag.
    open: Arc<AtomicBool>,
    /// Sender into the other end's event channel.
    remote_tx: mpsc::Sender<TransportEvent>,
    /// Sender into this end's own event channel (close echo).
    local_tx: mpsc::Sender<TransportEvent>,
    /// What this end reports about its peer.
    peer: PeerInfo,
    /// Number of payloads written.
    sent: AtomicUsize,
    /// Number of keepalives written.
    pings: AtomicUsize,
}

/// One end of a pair with its event channel.
pub type MemoryEnd = (Arc<MemoryTransport>, TransportEvents);

impl MemoryTransport {
    /// Creates a linked pair of transports.
    #[must_use]
    pub fn pair() -> (MemoryEnd, MemoryEnd) {
        Self::pair_with_peers(PeerInfo::default(), PeerInfo::default())
    }

    /// Creates a linked pair reporting the given peer information.
    ///
    /// `left_peer` is what the left end reports about its remote, and vice versa.
    #[must_use]
    pub fn pair_with_peers(left_peer: PeerInfo, right_peer: PeerInfo) -> (MemoryEnd, MemoryEnd) {
        let open = Arc::new(AtomicBool::new(true));
        let (left_tx, left_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (right_tx, right_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let left = Arc::new(Self {
            open: Arc::clone(&open),
            remote_tx: right_tx.clone(),
            local_tx: left_tx.clone(),
            peer: left_peer,
            sent: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        });

        let right = Arc::new(Self {
            open,
            remote_tx: left_tx,
            local_tx: right_tx,
            peer: right_peer,
            sent: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        });

        ((left, left_rx), (right, right_rx))
    }

    /// Returns the number of payloads written by this end.
    #[inline]
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }

    /// Returns the number of keepalives written by this end.
    #[inline]
    #[must_use]
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::Acquire)
    }

    /// Flips the readiness flag without delivering a close event.
    ///
    /// Simulates a link that is temporarily not writable.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }

    /// Delivers a transport error event to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the other end is gone.
    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.remote_tx
            .send(TransportEvent::Error(message.into()))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SocketNotOpen);
        }

        self.sent.fetch_add(1, Ordering::AcqRel);
        trace!(len = payload.len(), "Memory transport send");

        self.remote_tx
            .send(TransportEvent::Message(payload))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn ping(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SocketNotOpen);
        }

        self.pings.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let event = TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        };

        // The local end may be closing from inside its own event loop.
        let _ = self.local_tx.try_send(event.clone());
        let _ = self.remote_tx.send(event).await;
        Ok(())
    }

    fn peer(&self) -> PeerInfo {
        self.peer.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
