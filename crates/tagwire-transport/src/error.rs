use std::time::Duration;

use tagwire_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Dialing the remote address failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Dialing did not complete within the configured limit.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Encoding or writing a frame failed. The connection is gone.
    #[error("send failed: {0}")]
    SendFailed(#[source] ProtocolError),

    /// Reading or decoding a frame failed. The connection is gone.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] ProtocolError),

    /// No reply arrived within the configured limit.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// The reply slot failed (dropped without a reply, or nobody waiting).
    #[error("reply failed: {0}")]
    Reply(#[source] ProtocolError),

    /// The sender's connection was invalidated by an earlier error or
    /// closed; reconnect to continue.
    #[error("not connected")]
    NotConnected,

    /// `start` was called without a successful `listen`.
    #[error("receiver is not listening")]
    NotListening,

    /// The receiver's accept loop is already running.
    #[error("receiver is already running")]
    AlreadyRunning,

    /// The inbound queue is closed because the receiver was dropped.
    #[error("receiver shut down")]
    Shutdown,
}
