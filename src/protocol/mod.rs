//! Wire protocol: frames, headers, dictionary translation, validation, codec.
//!
//! Every transport message carries one logical frame:
//!
//! | Element | Request frame | Response frame |
//! |---------|---------------|----------------|
//! | `identifier` | `"METHOD path[?query]"` | numeric status |
//! | `headers` | object, carries the correlation id | object, echoes the correlation id |
//! | `body` | chunk or `null` | chunk or `null` |
//!
//! Multi-frame exchanges mark every frame but the last with a continuation
//! indicator (see [`Continuation`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame, identifier and request line types |
//! | `headers` | Header map and continuation signaling |
//! | `dictionary` | Canonical ↔ wire header translation |
//! | `validate` | Structural and identifier validation |
//! | `codec` | Pluggable payload codec |

// ============================================================================
// Submodules
// ============================================================================

/// Pluggable payload codec.
pub mod codec;

/// Canonical ↔ wire header translation.
pub mod dictionary;

/// Frame, identifier and request line types.
pub mod frame;

/// Header map and continuation signaling.
pub mod headers;

/// Decoded message validation.
pub mod validate;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, JsonCodec};
pub use dictionary::{HeaderAlias, HeaderDictionary};
pub use frame::{Frame, Identifier, Method, RequestLine};
pub use headers::{Continuation, DEFAULT_ID_HEADER, DEFAULT_MORE_HEADER, Headers};
pub use validate::{FrameError, validate};
