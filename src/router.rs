//! Inbound exchange routing.
//!
//! The connection calls [`Router::handle_request`] exactly once per inbound
//! correlation id, on its event loop, as soon as the first request frame
//! arrives. The request body may still be streaming.
//!
//! Handlers must not block; anything that awaits belongs in a spawned task:
//!
//! ```ignore
//! let connection = Connection::builder()
//!     .router(|mut request: IncomingRequest, mut response: OutgoingResponse| {
//!         tokio::spawn(async move {
//!             let body = request.read_to_end().await?;
//!             response.end_with(body.len()).await
//!         });
//!     })
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::exchange::{IncomingRequest, OutgoingResponse};

// ============================================================================
// Router
// ============================================================================

/// Receives every new inbound exchange.
pub trait Router: Send + Sync {
    /// Takes ownership of both streams of a new inbound exchange.
    ///
    /// Dropping the response without ending it aborts it.
    fn handle_request(&self, request: IncomingRequest, response: OutgoingResponse);
}

impl<F> Router for F
where
    F: Fn(IncomingRequest, OutgoingResponse) + Send + Sync,
{
    fn handle_request(&self, request: IncomingRequest, response: OutgoingResponse) {
        self(request, response);
    }
}

// ============================================================================
// Tests
// ============================================================================
