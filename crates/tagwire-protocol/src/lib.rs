//! Wire protocol for tagwire.
//!
//! This crate defines everything that happens between "bytes on a socket"
//! and "a message in the application's hands":
//!
//! - **Tags and messages** ([`Tag`], [`Message`], [`RawMessage`],
//!   [`TypedMessage`]): the unit of transport.
//! - **Reply slots** ([`ReplySlot`], [`ReplyHandle`]): the one-shot channel
//!   that routes a consumer's answer back to the request it belongs to.
//! - **Frames** ([`FrameEncoder`], [`FrameDecoder`], [`encode_frame`]):
//!   the `tag | len | payload` byte layout.
//! - **Payload formats** ([`PayloadFormat`], [`RawFormat`], [`Registry`]):
//!   raw bytes, or structured values decoded per tag through a [`Codec`].
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about listeners or dialing. It only
//! turns byte streams into messages and back:
//!
//! ```text
//! Transport (TcpStream) → Protocol (Message<P>) → Application
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod format;
mod frame;
mod message;
mod registry;
mod reply;
mod tag;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// `pub use` makes items from submodules available at the crate root.
// Users can write `use tagwire_protocol::Message` instead of
// `use tagwire_protocol::message::Message`.

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{BoxError, ProtocolError};
pub use format::{PayloadFormat, RawFormat};
pub use frame::{
    encode_frame, FrameDecoder, FrameEncoder, DEFAULT_MAX_PAYLOAD_LEN, HEADER_LEN,
};
pub use message::{Message, RawMessage, Structured, TypedMessage};
pub use registry::{Registry, Shape};
pub use reply::{ReplyHandle, ReplySlot};
pub use tag::Tag;
