//! Unified error type for tagwire.

use tagwire_protocol::ProtocolError;
use tagwire_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// When using the `tagwire` meta-crate you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TagwireError {
    /// A transport-level error (bind, connect, send, shutdown).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, codec, registry, reply slot).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Installing the global log subscriber failed.
    #[error("logging init failed: {0}")]
    Logging(String),
}
