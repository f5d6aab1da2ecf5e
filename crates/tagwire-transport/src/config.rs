//! Receiver and sender configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagwire_protocol::DEFAULT_MAX_PAYLOAD_LEN;

// ---------------------------------------------------------------------------
// ReceiverConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Receiver`](crate::Receiver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Capacity of the inbound queue. When it is full, connection loops
    /// stop reading until a consumer makes room.
    pub queue_capacity: usize,

    /// How long a connection waits for a consumer to answer a
    /// reply-requiring message. `None` waits forever.
    ///
    /// When the limit expires the connection is dropped, so the remote
    /// sender sees the stream end instead of hanging.
    pub reply_timeout: Option<Duration>,

    /// Largest inbound or outbound payload, in bytes.
    pub max_payload_len: usize,

    /// Set `TCP_NODELAY` on accepted connections.
    pub nodelay: bool,
}

impl ReceiverConfig {
    /// Default inbound queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - `queue_capacity` of 0 becomes 1 (a bounded queue needs room for at
    ///   least one message).
    pub fn validated(mut self) -> Self {
        if self.queue_capacity == 0 {
            tracing::warn!("queue_capacity of 0 is not allowed, using 1");
            self.queue_capacity = 1;
        }
        self
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            reply_timeout: None,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            nodelay: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SenderConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Sender`](crate::Sender).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Limit on establishing the TCP connection. `None` uses the OS limit.
    pub connect_timeout: Option<Duration>,

    /// Limit on waiting for the reply to a reply-requiring message.
    /// `None` waits forever. Expiry invalidates the connection.
    pub reply_timeout: Option<Duration>,

    /// Largest outbound or inbound payload, in bytes.
    pub max_payload_len: usize,

    /// Set `TCP_NODELAY` on the connection.
    pub nodelay: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            reply_timeout: None,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            nodelay: true,
        }
    }
}
