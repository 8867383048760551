//! Read side of an exchange half.
//!
//! The connection pushes decoded chunks into a bounded channel; the
//! application pulls them with [`IncomingExchange::chunk`] or as a
//! [`Stream`]. The connection never waits on a full channel; a consumer
//! that falls `chunk_capacity` chunks behind has its half aborted instead of
//! growing a buffer or stalling other exchanges.
//!
//! | Ending | `chunk()` | Stream |
//! |--------|-----------|--------|
//! | Terminal frame processed | `Ok(None)` | `None` |
//! | `destroy(false)` | `Ok(None)` | `None` |
//! | Connection closed, buffer overflow or `destroy(true)` | `Err(Aborted)` | `Some(Err(Aborted))`, then `None` |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::connection::core::ConnectionInner;
use crate::error::{Error, Result};
use crate::protocol::{Headers, Method, RequestLine};

use super::shape::{FrameShape, RequestShape, ResponseShape};
use super::signal::{ExchangeSignal, Outcome};

// ============================================================================
// Type Aliases
// ============================================================================

/// Request read by a server.
pub type IncomingRequest = IncomingExchange<RequestShape>;

/// Response read by a client.
pub type IncomingResponse = IncomingExchange<ResponseShape>;

// ============================================================================
// IncomingExchange
// ============================================================================

/// Read side of an exchange half.
pub struct IncomingExchange<S: FrameShape> {
    id: u64,
    head: S::Head,
    headers: Headers,
    chunks: mpsc::Receiver<Value>,
    signal: Arc<ExchangeSignal>,
    connection: Weak<ConnectionInner>,
    done: bool,
    _shape: PhantomData<fn() -> S>,
}

impl<S: FrameShape> fmt::Debug for IncomingExchange<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingExchange")
            .field("id", &self.id)
            .field("head", &self.head)
            .field("headers", &self.headers)
            .field("outcome", &self.signal.outcome())
            .finish_non_exhaustive()
    }
}

impl<S: FrameShape> IncomingExchange<S> {
    pub(crate) fn new(
        id: u64,
        head: S::Head,
        headers: Headers,
        chunks: mpsc::Receiver<Value>,
        signal: Arc<ExchangeSignal>,
        connection: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            id,
            head,
            headers,
            chunks,
            signal,
            connection,
            done: false,
            _shape: PhantomData,
        }
    }

    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the headers of the first frame, in canonical form.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the connection the exchange belongs to, if it is still alive.
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.connection.upgrade().map(Connection::from_inner)
    }

    /// Returns `true` once the terminal frame was processed.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.signal.is_completed()
    }

    /// Returns `true` if the exchange was torn down.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Waits until the half finishes.
    pub async fn finished(&self) -> Outcome {
        self.signal.finished().await
    }

    /// Receives the next chunk.
    ///
    /// Returns `Ok(None)` once the half ended cleanly.
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] if the exchange was torn down
    pub async fn chunk(&mut self) -> Result<Option<Value>> {
        if self.done {
            return self.terminal();
        }

        match self.chunks.recv().await {
            Some(chunk) => Ok(Some(chunk)),
            None => {
                self.done = true;
                self.terminal()
            }
        }
    }

    /// Receives every remaining chunk.
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] if the exchange is torn down before it completes
    pub async fn read_to_end(&mut self) -> Result<Vec<Value>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Ends the stream immediately.
    ///
    /// Buffered chunks are discarded and later frames for this half are
    /// dropped. With `abort` set, readers observe [`Error::Aborted`].
    /// Idempotent.
    pub fn destroy(&mut self, abort: bool) {
        let outcome = if abort {
            Outcome::Aborted
        } else {
            Outcome::Completed
        };
        self.signal.resolve(outcome);
        self.chunks.close();
        self.done = true;
    }

    fn terminal(&self) -> Result<Option<Value>> {
        if self.signal.is_completed() {
            Ok(None)
        } else {
            Err(Error::aborted(self.id))
        }
    }
}

impl<S: FrameShape> Stream for IncomingExchange<S> {
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.chunks.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(this.terminal().transpose())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// IncomingRequest
// ============================================================================

impl IncomingExchange<RequestShape> {
    /// Returns the parsed request line.
    #[inline]
    #[must_use]
    pub fn request_line(&self) -> &RequestLine {
        &self.head
    }

    /// Returns the method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> Method {
        self.head.method
    }

    /// Returns the path without query.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Returns the raw query string.
    #[inline]
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.head.query.as_deref()
    }

    /// Decodes the query string into `(key, value)` pairs.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.query() else {
            return Vec::new();
        };

        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key), decode_component(value))
            })
            .collect()
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(Cow::into_owned)
        .unwrap_or(raw)
}

// ============================================================================
// IncomingResponse
// ============================================================================

impl IncomingExchange<ResponseShape> {
    /// Returns the status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.head
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use serde_json::json;
    use tokio_test::{assert_pending, task};

    fn request(target: &str) -> (IncomingRequest, mpsc::Sender<Value>, Arc<ExchangeSignal>) {
        let line = RequestLine::parse(&format!("GET {target}")).expect("request line");
        let (tx, rx) = mpsc::channel(4);
        let signal = ExchangeSignal::new();
        let request =
            IncomingExchange::new(7, line, Headers::new(), rx, Arc::clone(&signal), Weak::new());
        (request, tx, signal)
    }

    #[test]
    fn test_query_pairs() {
        let (request, _, _) = request("/search?q=a%20b&flag&name=x+y");
        assert_eq!(request.path(), "/search");
        assert_eq!(
            request.query_pairs(),
            vec![
                ("q".to_string(), "a b".to_string()),
                ("flag".to_string(), String::new()),
                ("name".to_string(), "x y".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunks_then_clean_end() -> anyhow::Result<()> {
        let (mut request, tx, signal) = request("/");
        tx.send(json!(1)).await?;
        tx.send(json!(2)).await?;
        signal.complete();
        drop(tx);

        assert_eq!(request.read_to_end().await?, vec![json!(1), json!(2)]);
        assert!(request.is_complete());
        assert_eq!(request.chunk().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_surfaces_as_error() {
        let (mut request, tx, signal) = request("/");
        signal.abort();
        drop(tx);

        assert!(matches!(request.chunk().await, Err(Error::Aborted { id: 7 })));
        assert!(matches!(request.chunk().await, Err(Error::Aborted { id: 7 })));
    }

    #[tokio::test]
    async fn test_stream_yields_abort_once() {
        let (mut request, tx, signal) = request("/");
        tx.send(json!("a")).await.expect("send");
        signal.abort();
        drop(tx);

        assert!(matches!(request.next().await, Some(Ok(_))));
        assert!(matches!(request.next().await, Some(Err(Error::Aborted { .. }))));
        assert!(request.next().await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_ends_immediately() {
        let (mut request, tx, _signal) = request("/");
        tx.send(json!("buffered")).await.expect("send");

        request.destroy(false);
        request.destroy(true);

        assert_eq!(request.chunk().await.ok(), Some(None));
        assert!(tx.send(json!("late")).await.is_err());
    }

    #[test]
    fn test_chunk_waits_for_delivery() {
        let (mut request, _tx, _signal) = request("/");
        let mut chunk = task::spawn(request.chunk());
        assert_pending!(chunk.poll());
    }
}
