//! Incoming frame dispatch.
//!
//! Runs on the connection's event loop, one frame at a time. Nothing here
//! waits on a consumer: table updates happen on arrival and chunks go into
//! the half's bounded buffer (`chunk_capacity`) without blocking. A half
//! whose buffer overflows is aborted alone, so a stalled reader never holds
//! up sibling exchanges.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::exchange::table::{CorrelationTable, ExchangeEntry, HalfState};
use crate::exchange::{
    ExchangeSignal, Half, IncomingExchange, IncomingRequest, OutgoingExchange, OutgoingResponse,
    Outcome,
};
use crate::protocol::{Headers, Identifier, RequestLine, validate};
use crate::transport::Payload;

use super::core::ConnectionInner;

// ============================================================================
// Constants
// ============================================================================

/// Status of a response nobody has set one on.
pub(crate) const DEFAULT_STATUS: u16 = 200;

/// Upgrade header never inherited by requests.
const ACCEPT_HEADER: &str = "accept";

// ============================================================================
// Message Handling
// ============================================================================

/// Decodes, validates, translates and dispatches one payload.
///
/// Decode failures close with `1003` whatever error the codec reports,
/// validation failures with `1002`.
pub(crate) async fn handle_message(inner: &Arc<ConnectionInner>, payload: Payload) {
    let value = match inner.codec().decode(&payload) {
        Ok(value) => value,
        Err(e @ Error::Codec { .. }) => return inner.fail(e).await,
        Err(e) => return inner.fail(Error::codec(e.to_string())).await,
    };

    let frame = match validate(value) {
        Ok(frame) => frame,
        Err(e) => return inner.fail(Error::from(e)).await,
    };

    let headers = inner.options.dictionary.from_wire(&frame.headers);
    trace!(identifier = ?frame.identifier, "Frame received");

    match frame.identifier {
        Identifier::Request(line) => dispatch_request(inner, line, headers, frame.body).await,
        Identifier::Status(status) => dispatch_response(inner, status, headers, frame.body),
    }
}

// ============================================================================
// Request Direction
// ============================================================================

async fn dispatch_request(
    inner: &Arc<ConnectionInner>,
    line: RequestLine,
    headers: Headers,
    body: Option<Value>,
) {
    let options = &inner.options;
    let Some(id) = headers.correlation_id(&options.id_header) else {
        let message = format!("Request frame '{line}' carries no '{}'", options.id_header);
        return inner.fail(Error::protocol(message)).await;
    };

    let more = options.continuation.is_more(&headers);

    let existing = inner.inbound.with_entry(id, |entry| {
        let half = &entry.request;
        match (&half.chunks, half.released) {
            (Some(chunks), false) => Some(chunks.clone()),
            _ => None,
        }
    });

    let chunks = match existing {
        Some(Some(delivery)) => delivery,
        Some(None) => {
            warn!(id, %line, "Request frame after end of request, dropped");
            return;
        }
        None => match open_inbound(inner, id, line, headers) {
            Some(delivery) => delivery,
            None => return,
        },
    };

    if !deliver(&inner.inbound, id, Half::Request, &chunks, body) {
        return;
    }

    if !more {
        inner
            .inbound
            .release(id, Half::Request, Outcome::Completed);
        trace!(id, "Request complete");
    }
}

/// Registers a new inbound exchange and hands it to the router.
fn open_inbound(
    inner: &Arc<ConnectionInner>,
    id: u64,
    line: RequestLine,
    mut headers: Headers,
) -> Option<mpsc::Sender<Value>> {
    let Some(router) = inner.router() else {
        warn!(id, %line, "No router installed, request dropped");
        return None;
    };

    if inner.options.inherit_upgrade_headers
        && let Some(mut upgrade) = inner.upgrade_headers()
    {
        upgrade.remove(ACCEPT_HEADER);
        headers.merge_missing(&upgrade);
    }

    let id_header = &inner.options.id_header;
    let mut response_headers = Headers::new();
    if let Some(value) = headers.get(id_header) {
        response_headers.set(id_header.clone(), value.clone());
    }

    let (chunks_tx, chunks_rx) = mpsc::channel(inner.options.chunk_capacity);
    let request_signal = ExchangeSignal::new();
    let response_signal = ExchangeSignal::new();
    let connection = Arc::downgrade(inner);

    debug!(id, %line, "Inbound exchange opened");

    let request: IncomingRequest = IncomingExchange::new(
        id,
        line,
        headers,
        chunks_rx,
        Arc::clone(&request_signal),
        connection.clone(),
    );
    let response: OutgoingResponse = OutgoingExchange::new(
        id,
        DEFAULT_STATUS,
        response_headers,
        connection,
        Arc::clone(&response_signal),
    );

    inner.inbound.insert(
        id,
        ExchangeEntry {
            request: HalfState::incoming(Arc::clone(&request_signal), Some(chunks_tx.clone())),
            response: HalfState::outgoing(response_signal),
            response_head: None,
        },
    );

    router.handle_request(request, response);
    Some(chunks_tx)
}

// ============================================================================
// Response Direction
// ============================================================================

fn dispatch_response(
    inner: &Arc<ConnectionInner>,
    status: u16,
    headers: Headers,
    body: Option<Value>,
) {
    let Some(id) = headers.correlation_id(&inner.options.id_header) else {
        debug!(status, "Response frame without correlation id, dropped");
        return;
    };

    let more = inner.options.continuation.is_more(&headers);
    let capacity = inner.options.chunk_capacity;
    let connection = Arc::downgrade(inner);

    let delivery = inner.outbound.with_entry(id, |entry| {
        let half = &mut entry.response;
        if half.released {
            return None;
        }

        if let Some(chunks) = &half.chunks {
            return Some(chunks.clone());
        }
        let signal = Arc::clone(&half.signal);

        let (chunks_tx, chunks_rx) = mpsc::channel(capacity);
        half.chunks = Some(chunks_tx.clone());

        let response =
            IncomingExchange::new(id, status, headers, chunks_rx, signal, connection);
        if let Some(head) = entry.response_head.take()
            && head.send(response).is_err()
        {
            trace!(id, "Response consumer gone");
        }

        Some(chunks_tx)
    });

    let Some(Some(chunks)) = delivery else {
        debug!(id, status, "Response for unknown exchange, dropped");
        return;
    };

    if !deliver(&inner.outbound, id, Half::Response, &chunks, body) {
        return;
    }

    if !more {
        inner
            .outbound
            .release(id, Half::Response, Outcome::Completed);
        trace!(id, "Response complete");
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Pushes a chunk without waiting for the consumer.
///
/// A full buffer aborts the half: its reader gets what was buffered and then
/// [`Error::Aborted`], later frames for it are dropped. Returns `false` if the
/// half was aborted here.
fn deliver(
    table: &CorrelationTable,
    id: u64,
    half: Half,
    chunks: &mpsc::Sender<Value>,
    body: Option<Value>,
) -> bool {
    let Some(chunk) = body else {
        return true;
    };

    match chunks.try_send(chunk) {
        Ok(()) => true,
        Err(TrySendError::Closed(_)) => {
            trace!(id, ?half, "Chunk consumer gone");
            true
        }
        Err(TrySendError::Full(_)) => {
            warn!(id, ?half, capacity = chunks.max_capacity(), "Chunk buffer full, aborting half");
            table.release(id, half, Outcome::Aborted);
            false
        }
    }
}
