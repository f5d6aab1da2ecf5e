//! # tagwire
//!
//! Tagged message transport over TCP.
//!
//! Every message carries a one-byte tag and a payload. Tags above 127 ask
//! for a reply; the receiving side hands the consumer a message with a
//! reply slot attached, and whatever the consumer places there travels
//! back on the same connection. Payloads are raw bytes, or structured
//! values encoded per tag through a [`Registry`].
//!
//! ## Layers
//!
//! - [`tagwire_protocol`]: tags, messages, reply slots, frames, registry.
//! - [`tagwire_transport`]: [`Receiver`], [`Sender`], the inbound queue.
//! - this crate: [`Dispatcher`], [`TagwireError`], [`logging`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagwire::prelude::*;
//!
//! # async fn run() -> Result<(), TagwireError> {
//! let mut receiver = Receiver::bind("127.0.0.1:7000").await?;
//! receiver.go_start()?;
//!
//! let mut sender = Sender::connect("127.0.0.1:7000").await?;
//! sender.send(&RawMessage::new(3, b"hello".to_vec())).await?;
//!
//! let msg = receiver.recv().await;
//! assert_eq!(msg.map(|m| m.into_payload()), Some(b"hello".to_vec()));
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod error;
pub mod logging;

pub use dispatch::{Dispatched, Dispatcher, Handler};
pub use error::TagwireError;

pub use tagwire_protocol::{
    encode_frame, Codec, FrameDecoder, FrameEncoder, Message, PayloadFormat, ProtocolError,
    RawFormat, RawMessage, Registry, ReplyHandle, ReplySlot, Shape, Structured, Tag,
    TypedMessage, DEFAULT_MAX_PAYLOAD_LEN, HEADER_LEN,
};
#[cfg(feature = "json")]
pub use tagwire_protocol::JsonCodec;
pub use tagwire_transport::{
    deliver_locally, Inbox, LocalSender, Receiver, ReceiverBuilder,
    ReceiverConfig, Sender, SenderConfig, StopHandle, TransportError, TypedReceiver,
    TypedSender,
};

/// The types most programs need.
pub mod prelude {
    pub use crate::{
        Dispatched, Dispatcher, Message, RawMessage, Receiver, ReceiverBuilder, ReceiverConfig,
        Registry, Sender, SenderConfig, Tag, TagwireError, TypedMessage,
    };
    #[cfg(feature = "json")]
    pub use crate::JsonCodec;
}
