//! Error types for the protocol layer.
//!
//! Each crate in tagwire defines its own error enum. A `ProtocolError`
//! always means something went wrong while turning bytes into messages
//! (or back), or while handing a reply through a reply slot, never a
//! problem with binding sockets or dialing peers.

use crate::Tag;

/// A codec's own error type, erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the protocol layer.
///
/// `#[derive(thiserror::Error)]` auto-generates the `std::error::Error`
/// trait implementation. The `#[error("...")]` attributes define the
/// human-readable message for each variant, which is what you see when you
/// print the error or it shows up in logs.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the stream cleanly on a frame boundary.
    ///
    /// This is the normal way for a connection to end, so serve loops
    /// treat it as "done" rather than as a failure.
    #[error("stream closed")]
    Closed,

    /// The stream ended in the middle of a frame.
    #[error("truncated frame: expected {expected} more bytes")]
    Truncated {
        /// How many bytes the decoder was still waiting for.
        expected: usize,
    },

    /// Reading from or writing to the underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload does not fit the frame's length field, or exceeds the
    /// configured maximum.
    #[error("payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge {
        /// Actual (or announced) payload length.
        len: usize,
        /// The limit that was exceeded.
        max: usize,
    },

    /// A typed frame arrived with a tag that was never registered.
    #[error("unregistered tag {0}")]
    UnregisteredTag(Tag),

    /// A structured payload's Rust type does not match the shape
    /// registered for its tag.
    #[error("tag {tag} expects payload type {expected}, got {actual}")]
    ShapeMismatch {
        /// The message tag.
        tag: Tag,
        /// Type name registered for the tag.
        expected: &'static str,
        /// Type name of the payload that was supplied.
        actual: &'static str,
    },

    /// Serialization failed (turning a Rust type into bytes).
    ///
    /// The inner error is whatever the codec reported, boxed so callers
    /// deal with `ProtocolError` uniformly regardless of which codec
    /// produced it.
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed payloads, missing required fields,
    /// or bytes that belong to a different shape than the tag says.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    /// The message has no reply slot to answer through.
    ///
    /// Either the tag does not require a reply, or the slot was already
    /// used.
    #[error("message with tag {0} has no reply slot")]
    NoReplySlot(Tag),

    /// The side waiting for a reply went away before the reply was placed.
    #[error("reply receiver dropped")]
    ReplyReceiverGone,

    /// The reply slot was dropped without a reply ever being placed.
    #[error("reply slot dropped without a reply")]
    ReplyDropped,
}

impl ProtocolError {
    /// Wraps a codec's serialization error.
    pub fn encode(err: impl Into<BoxError>) -> Self {
        Self::Encode(err.into())
    }

    /// Wraps a codec's deserialization error.
    pub fn decode(err: impl Into<BoxError>) -> Self {
        Self::Decode(err.into())
    }

    /// Returns `true` if this error means the peer closed the stream on a
    /// frame boundary.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
