//! Correlation tables.
//!
//! One table per direction of origin maps a correlation id to the
//! connection-side state of both halves of that exchange. The connection is
//! the only writer; streams reach it through release calls.
//!
//! An entry is removed once both halves are released. Release and removal
//! are idempotent so close-driven and completion-driven cleanup can race.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::incoming::IncomingResponse;
use super::shape::{Half, TableKind};
use super::signal::{ExchangeSignal, Outcome};

// ============================================================================
// HalfState
// ============================================================================

/// Connection-side state of one exchange half.
#[derive(Debug)]
pub(crate) struct HalfState {
    /// Signal shared with the stream.
    pub signal: Arc<ExchangeSignal>,
    /// Chunk sender for incoming halves.
    pub chunks: Option<mpsc::Sender<Value>>,
    /// Set once the connection no longer expects frames for this half.
    pub released: bool,
}

impl HalfState {
    /// Creates state for a half whose frames this side receives.
    pub fn incoming(signal: Arc<ExchangeSignal>, chunks: Option<mpsc::Sender<Value>>) -> Self {
        Self {
            signal,
            chunks,
            released: false,
        }
    }

    /// Creates state for a half whose frames this side writes.
    pub fn outgoing(signal: Arc<ExchangeSignal>) -> Self {
        Self::incoming(signal, None)
    }

    /// Resolves the signal and drops the chunk sender.
    pub fn release(&mut self, outcome: Outcome) {
        self.signal.resolve(outcome);
        self.chunks = None;
        self.released = true;
    }
}

// ============================================================================
// ExchangeEntry
// ============================================================================

/// Table entry for one live correlation id.
#[derive(Debug)]
pub(crate) struct ExchangeEntry {
    /// Request half.
    pub request: HalfState,
    /// Response half.
    pub response: HalfState,
    /// Hands the response stream to the requester on the first response frame.
    pub response_head: Option<oneshot::Sender<IncomingResponse>>,
}

impl ExchangeEntry {
    /// Returns the state of one half.
    pub fn half_mut(&mut self, half: Half) -> &mut HalfState {
        match half {
            Half::Request => &mut self.request,
            Half::Response => &mut self.response,
        }
    }

    /// Returns `true` once both halves are released.
    pub fn is_done(&self) -> bool {
        self.request.released && self.response.released
    }

    /// Aborts both halves.
    pub fn abort(mut self) {
        self.request.release(Outcome::Aborted);
        self.response.release(Outcome::Aborted);
        self.response_head = None;
    }
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Map from correlation id to exchange entry.
#[derive(Debug)]
pub(crate) struct CorrelationTable {
    kind: TableKind,
    entries: Mutex<FxHashMap<u64, ExchangeEntry>>,
}

impl CorrelationTable {
    /// Creates an empty table.
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Inserts an entry. Returns `false` and keeps the existing entry if the id is live.
    pub fn insert(&self, id: u64, entry: ExchangeEntry) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, entry);
        trace!(table = ?self.kind, id, "Exchange registered");
        true
    }

    /// Returns `true` if the id is live.
    pub fn contains(&self, id: u64) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Returns the number of live exchanges.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Runs `f` against a live entry.
    pub fn with_entry<R>(&self, id: u64, f: impl FnOnce(&mut ExchangeEntry) -> R) -> Option<R> {
        self.entries.lock().get_mut(&id).map(f)
    }

    /// Releases one half and removes the entry once both halves are released.
    ///
    /// Returns `true` if this call removed the entry. Releasing an unknown id
    /// or an already released half is a no-op.
    pub fn release(&self, id: u64, half: Half, outcome: Outcome) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };

        let state = entry.half_mut(half);
        if !state.released {
            state.release(outcome);
        }

        if half == Half::Response {
            entry.response_head = None;
        }

        if entry.is_done() {
            entries.remove(&id);
            trace!(table = ?self.kind, id, "Exchange released");
            return true;
        }
        false
    }

    /// Removes an entry without touching its halves.
    pub fn remove(&self, id: u64) -> Option<ExchangeEntry> {
        self.entries.lock().remove(&id)
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<(u64, ExchangeEntry)> {
        self.entries.lock().drain().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
