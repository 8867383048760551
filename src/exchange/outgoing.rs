//! Write side of an exchange half.
//!
//! [`OutgoingExchange`] turns `write`/`end` calls into frames. The head
//! (request line or status) and headers are buffered until the first frame
//! is sent and frozen afterwards. Every write is awaited until the transport
//! accepts the frame, which paces the producer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::connection::ConnectionOptions;
use crate::connection::core::ConnectionInner;
use crate::error::{Error, Result};
use crate::protocol::{Frame, Headers, Method};

use super::incoming::IncomingResponse;
use super::shape::{Direction, FrameShape, Half, RequestShape, ResponseShape, TableKind};
use super::signal::{ExchangeSignal, Outcome};

// ============================================================================
// OutgoingExchange
// ============================================================================

/// Write side of an exchange half.
///
/// Dropping an unfinished stream aborts its half.
pub struct OutgoingExchange<S: FrameShape> {
    id: u64,
    head: S::Head,
    headers: Headers,
    connection: Weak<ConnectionInner>,
    signal: Arc<ExchangeSignal>,
    frames_sent: usize,
    response: Option<oneshot::Receiver<IncomingResponse>>,
    _shape: PhantomData<fn() -> S>,
}

impl<S: FrameShape> fmt::Debug for OutgoingExchange<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingExchange")
            .field("id", &self.id)
            .field("head", &self.head)
            .field("frames_sent", &self.frames_sent)
            .field("outcome", &self.signal.outcome())
            .finish_non_exhaustive()
    }
}

impl<S: FrameShape> OutgoingExchange<S> {
    pub(crate) fn new(
        id: u64,
        head: S::Head,
        headers: Headers,
        connection: Weak<ConnectionInner>,
        signal: Arc<ExchangeSignal>,
    ) -> Self {
        Self {
            id,
            head,
            headers,
            connection,
            signal,
            frames_sent: 0,
            response: None,
            _shape: PhantomData,
        }
    }

    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the buffered headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Sets a header on every following frame.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Removes a header from every following frame.
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Returns the number of frames written so far.
    #[inline]
    #[must_use]
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Returns `true` if the half was aborted.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Returns `true` once the half finished either way.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.signal.is_open()
    }

    /// Waits until the half finishes.
    pub async fn finished(&self) -> Outcome {
        self.signal.finished().await
    }

    /// Writes one chunk, marking that more frames follow.
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] if the exchange was torn down
    /// - [`Error::StreamFinished`] after `end()`
    /// - [`Error::SocketNotOpen`] if the transport is not ready; the exchange stays usable
    /// - [`Error::Codec`] if the frame cannot be encoded
    pub async fn write(&mut self, chunk: impl Into<Value>) -> Result<()> {
        self.send(Some(chunk.into()), true).await
    }

    /// Sends the terminal frame without a body and releases the half.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub async fn end(&mut self) -> Result<()> {
        self.send(None, false).await?;
        self.finish(Outcome::Completed);
        Ok(())
    }

    /// Sends the terminal frame carrying a last chunk and releases the half.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub async fn end_with(&mut self, chunk: impl Into<Value>) -> Result<()> {
        self.send(Some(chunk.into()), false).await?;
        self.finish(Outcome::Completed);
        Ok(())
    }

    /// Ends the half immediately. Idempotent.
    ///
    /// With `abort` set the half is marked aborted so both ends of the
    /// application can tell it apart from a clean finish. A clean destroy
    /// of an unfinished half queues the terminal frame in the background
    /// so the peer sees the stream end; without a live connection or
    /// runtime to send it on, the half is aborted instead.
    pub fn destroy(&mut self, abort: bool) {
        if !self.signal.is_open() {
            return;
        }
        if abort {
            self.finish(Outcome::Aborted);
            return;
        }

        match (self.connection.upgrade(), Handle::try_current()) {
            (Some(inner), Ok(handle)) => {
                let frame = self.frame(&inner.options, None, false);
                let id = self.id;
                handle.spawn(async move {
                    if let Err(e) = inner.send_frame(frame).await {
                        warn!(id, error = %e, "Terminal frame of destroyed stream not sent");
                    }
                });
                self.frames_sent += 1;
                trace!(id, "Destroyed stream ended in background");
                self.finish(Outcome::Completed);
            }
            _ => {
                debug!(id = self.id, "No connection to end destroyed stream, aborting");
                self.finish(Outcome::Aborted);
            }
        }
    }

    fn frame(&self, options: &ConnectionOptions, body: Option<Value>, more: bool) -> Frame {
        let mut headers = self.headers.clone();
        if !headers.contains(&options.id_header) {
            headers.set(options.id_header.clone(), self.id);
        }
        options.continuation.apply(&mut headers, more);
        Frame::new(S::identifier(&self.head), headers, body)
    }

    async fn send(&mut self, body: Option<Value>, more: bool) -> Result<()> {
        match self.signal.outcome() {
            Some(Outcome::Aborted) => return Err(Error::aborted(self.id)),
            Some(Outcome::Completed) => return Err(Error::stream_finished(self.id)),
            None => {}
        }

        let inner = self.connection.upgrade().ok_or(Error::ConnectionClosed)?;
        let frame = self.frame(&inner.options, body, more);
        inner.send_frame(frame).await?;

        self.frames_sent += 1;
        trace!(id = self.id, more, "Exchange frame written");
        Ok(())
    }

    fn finish(&mut self, outcome: Outcome) {
        if !self.signal.resolve(outcome) {
            return;
        }

        let Some(inner) = self.connection.upgrade() else {
            return;
        };

        let table = TableKind::of(S::HALF, Direction::Outgoing);
        inner.release(table, self.id, S::HALF, outcome);

        // An aborted request takes its exchange down; late responses are
        // dropped as unknown.
        if S::HALF == Half::Request && outcome == Outcome::Aborted {
            inner.release(table, self.id, Half::Response, Outcome::Aborted);
        }
    }

    /// Returns the head for mutation, or `None` once frames went out.
    fn head_mut(&mut self) -> Option<&mut S::Head> {
        if self.frames_sent > 0 {
            warn!(id = self.id, "Head already sent, change ignored");
            return None;
        }
        Some(&mut self.head)
    }
}

impl<S: FrameShape> Drop for OutgoingExchange<S> {
    fn drop(&mut self) {
        if self.signal.is_open() {
            trace!(id = self.id, "Unfinished outgoing stream dropped");
            self.finish(Outcome::Aborted);
        }
    }
}

// ============================================================================
// OutgoingRequest
// ============================================================================

impl OutgoingExchange<RequestShape> {
    pub(crate) fn with_response(mut self, response: oneshot::Receiver<IncomingResponse>) -> Self {
        self.response = Some(response);
        self
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
    pub fn query_string(&self) -> Option<&str> {
        self.head.query.as_deref()
    }

    /// Sets the method. Ignored once frames were sent.
    pub fn set_method(&mut self, method: Method) -> &mut Self {
        if let Some(head) = self.head_mut() {
            head.method = method;
        }
        self
    }

    /// Sets the path. A `?query` suffix replaces the query string.
    ///
    /// Ignored once frames were sent.
    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        if let Some(head) = self.head_mut() {
            match path.split_once('?') {
                Some((path, query)) => {
                    head.path = path.to_string();
                    head.query = Some(query.to_string());
                }
                None => head.path = path,
            }
        }
        self
    }

    /// Appends a percent-encoded `key=value` pair to the query string.
    ///
    /// Ignored once frames were sent.
    pub fn query(&mut self, key: &str, value: &str) -> &mut Self {
        let pair = format!("{}={}", urlencoding::encode(key), urlencoding::encode(value));
        if let Some(head) = self.head_mut() {
            head.query = Some(match head.query.take() {
                Some(query) if !query.is_empty() => format!("{query}&{pair}"),
                _ => pair,
            });
        }
        self
    }

    /// Waits for the first response frame.
    ///
    /// Resolves as soon as status and headers are known; the body streams
    /// through the returned [`IncomingResponse`].
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] if the exchange is torn down before a response arrives
    /// - [`Error::StreamFinished`] if the response was already taken
    pub async fn response(&mut self) -> Result<IncomingResponse> {
        let receiver = self
            .response
            .take()
            .ok_or_else(|| Error::stream_finished(self.id))?;

        receiver.await.map_err(|_| Error::aborted(self.id))
    }
}

// ============================================================================
// OutgoingResponse
// ============================================================================

impl OutgoingExchange<ResponseShape> {
    /// Returns the status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.head
    }

    /// Sets the status. Ignored once frames were sent.
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        if let Some(head) = self.head_mut() {
            *head = status;
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::RequestLine;

    fn detached_request() -> OutgoingExchange<RequestShape> {
        OutgoingExchange::new(
            9,
            RequestLine::new(Method::Get, "/"),
            Headers::new(),
            Weak::new(),
            ExchangeSignal::new(),
        )
    }

    #[test]
    fn test_query_pairs_are_encoded() {
        let mut request = detached_request();
        request.set_path("/search?lang=en");
        request.query("q", "a b&c").query("page", "2");

        assert_eq!(request.path(), "/search");
        assert_eq!(request.query_string(), Some("lang=en&q=a%20b%26c&page=2"));
    }

    #[test]
    fn test_set_method() {
        let mut request = detached_request();
        request.set_method(Method::Patch);
        assert_eq!(request.method(), Method::Patch);
    }

    #[tokio::test]
    async fn test_write_without_connection() {
        let mut request = detached_request();
        let result = request.write("x").await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(request.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let mut request = detached_request();
        request.destroy(true);
        request.destroy(false);

        assert!(request.is_finished());
        assert!(request.is_aborted());
        assert!(matches!(request.end().await, Err(Error::Aborted { id: 9 })));
    }

    #[tokio::test]
    async fn test_clean_destroy_without_connection_aborts() {
        let mut request = detached_request();
        request.destroy(false);

        assert!(request.is_aborted());
        assert_eq!(request.frames_sent(), 0);
        assert!(matches!(request.write("x").await, Err(Error::Aborted { id: 9 })));
    }

    #[tokio::test]
    async fn test_response_taken_once() {
        let mut request = detached_request();
        let (tx, rx) = oneshot::channel();
        request = request.with_response(rx);
        drop(tx);

        assert!(matches!(request.response().await, Err(Error::Aborted { id: 9 })));
        assert!(matches!(request.response().await, Err(Error::StreamFinished { id: 9 })));
    }

    #[test]
    fn test_status_setter() {
        let mut response: OutgoingExchange<ResponseShape> =
            OutgoingExchange::new(1, 200, Headers::new(), Weak::new(), ExchangeSignal::new());
        response.set_status(404);
        assert_eq!(response.status(), 404);
    }
}
