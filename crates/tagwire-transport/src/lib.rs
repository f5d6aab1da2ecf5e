//! TCP transport for tagwire.
//!
//! A [`Receiver`] listens, accepts any number of connections, decodes the
//! frames each one carries, and queues the resulting messages for
//! consumers. A [`Sender`] holds one connection to a receiver and writes
//! messages to it, waiting for the reply when a tag demands one.
//!
//! ```text
//! Sender ──frames──► Receiver ──► Inbox ──► consumer
//!        ◄──reply───          ◄── reply slot ◄──┘
//! ```
//!
//! Both sides are generic over a [`PayloadFormat`](tagwire_protocol::PayloadFormat):
//! raw bytes by default, or structured values through a
//! [`Registry`](tagwire_protocol::Registry) ([`TypedReceiver`],
//! [`TypedSender`]).

mod config;
mod error;
mod inbox;
mod receiver;
mod sender;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::TransportError;
pub use inbox::{Inbox, LocalSender};
pub use receiver::{deliver_locally, Receiver, ReceiverBuilder, StopHandle, TypedReceiver};
pub use sender::{Sender, TypedSender};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies an accepted connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next process-wide id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
