//! Frame shapes and directions.
//!
//! The four stream roles differ only in which identifier they put on the
//! wire and which way the frames travel:
//!
//! | Role | Shape | Direction | Table |
//! |------|-------|-----------|-------|
//! | `OutgoingRequest` | [`RequestShape`] | outgoing | outbound |
//! | `IncomingResponse` | [`ResponseShape`] | incoming | outbound |
//! | `IncomingRequest` | [`RequestShape`] | incoming | inbound |
//! | `OutgoingResponse` | [`ResponseShape`] | outgoing | inbound |

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use crate::protocol::{Identifier, RequestLine};

// ============================================================================
// Half / Direction / TableKind
// ============================================================================

/// Which half of an exchange a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    /// Request direction.
    Request,
    /// Response direction.
    Response,
}

/// Which way a stream's frames travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames arrive from the peer.
    Incoming,
    /// Frames are written to the peer.
    Outgoing,
}

/// Which correlation table tracks an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Exchanges the peer originated.
    Inbound,
    /// Exchanges this side originated.
    Outbound,
}

impl TableKind {
    /// Resolves the table for a half travelling in a direction.
    #[inline]
    #[must_use]
    pub const fn of(half: Half, direction: Direction) -> Self {
        match (half, direction) {
            (Half::Request, Direction::Outgoing) | (Half::Response, Direction::Incoming) => {
                Self::Outbound
            }
            (Half::Request, Direction::Incoming) | (Half::Response, Direction::Outgoing) => {
                Self::Inbound
            }
        }
    }
}

// ============================================================================
// FrameShape
// ============================================================================

/// Strategy for building a frame identifier from a stream's head.
pub trait FrameShape: Send + Sync + 'static {
    /// Head data the identifier is built from.
    type Head: Clone + Debug + Send + Sync + Unpin;

    /// Half this shape carries.
    const HALF: Half;

    /// Builds the wire identifier.
    fn identifier(head: &Self::Head) -> Identifier;
}

/// Request frames: `METHOD path[?query]`.
#[derive(Debug, Clone, Copy)]
pub struct RequestShape;

impl FrameShape for RequestShape {
    type Head = RequestLine;

    const HALF: Half = Half::Request;

    fn identifier(head: &Self::Head) -> Identifier {
        Identifier::Request(head.clone())
    }
}

/// Response frames: numeric status.
#[derive(Debug, Clone, Copy)]
pub struct ResponseShape;

impl FrameShape for ResponseShape {
    type Head = u16;

    const HALF: Half = Half::Response;

    fn identifier(head: &Self::Head) -> Identifier {
        Identifier::Status(*head)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::Method;

    #[test]
    fn test_table_resolution() {
        assert_eq!(TableKind::of(Half::Request, Direction::Outgoing), TableKind::Outbound);
        assert_eq!(TableKind::of(Half::Response, Direction::Incoming), TableKind::Outbound);
        assert_eq!(TableKind::of(Half::Request, Direction::Incoming), TableKind::Inbound);
        assert_eq!(TableKind::of(Half::Response, Direction::Outgoing), TableKind::Inbound);
    }

    #[test]
    fn test_identifiers() {
        let line = RequestLine::new(Method::Delete, "/x");
        assert_eq!(
            RequestShape::identifier(&line),
            Identifier::Request(line.clone())
        );
        assert_eq!(ResponseShape::identifier(&201), Identifier::Status(201));
    }
}
