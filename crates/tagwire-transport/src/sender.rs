//! The sending side: one persistent connection to a receiver.

use std::net::SocketAddr;
use std::sync::Arc;

use tagwire_protocol::{
    FrameDecoder, FrameEncoder, Message, PayloadFormat, ProtocolError, RawFormat,
    Registry,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::{SenderConfig, TransportError};

/// A sender whose payloads are encoded through a [`Registry`].
pub type TypedSender<C> = Sender<Registry<C>>;

struct Conn<F: PayloadFormat> {
    encoder: FrameEncoder<OwnedWriteHalf, F>,
    decoder: FrameDecoder<OwnedReadHalf, F>,
}

/// Holds one TCP connection to a receiver and exchanges messages over it.
///
/// Messages go out in call order. For a reply-requiring tag,
/// [`send`](Self::send) blocks until the reply frame arrives, so at most one
/// request is in flight per sender.
///
/// Any I/O or framing failure invalidates the connection; every later call
/// returns [`TransportError::NotConnected`] and the caller reconnects with a
/// fresh sender.
pub struct Sender<F: PayloadFormat = RawFormat> {
    peer: SocketAddr,
    config: SenderConfig,
    conn: Option<Conn<F>>,
}

impl Sender<RawFormat> {
    /// Connects to `addr` with raw payloads and default settings.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        Self::connect_with(addr, Arc::new(RawFormat), SenderConfig::default()).await
    }
}

impl<F: PayloadFormat> Sender<F> {
    /// Connects to `addr`, encoding payloads with `format`.
    ///
    /// # Errors
    /// - [`TransportError::Connect`] if dialing fails.
    /// - [`TransportError::ConnectTimeout`] if `config.connect_timeout`
    ///   expires first.
    pub async fn connect_with(
        addr: &str,
        format: Arc<F>,
        config: SenderConfig,
    ) -> Result<Self, TransportError> {
        let stream = match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| TransportError::ConnectTimeout(limit))?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(TransportError::Connect)?;

        if config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
        }
        let peer = stream.peer_addr().map_err(TransportError::Connect)?;
        tracing::debug!(%peer, "sender connected");

        let (read, write) = stream.into_split();
        let max = config.max_payload_len;
        let conn = Conn {
            encoder: FrameEncoder::new(write, Arc::clone(&format))
                .with_max_payload_len(max),
            decoder: FrameDecoder::new(read, format).with_max_payload_len(max),
        };

        Ok(Self {
            peer,
            config,
            conn: Some(conn),
        })
    }

    /// Sends `msg` and, if its tag requires one, waits for the reply.
    ///
    /// Returns `Ok(None)` for fire-and-forget tags once the frame is
    /// written.
    ///
    /// # Errors
    /// - [`TransportError::NotConnected`] after an earlier failure or
    ///   [`close`](Self::close).
    /// - [`TransportError::SendFailed`] if the frame could not be written.
    /// - [`TransportError::ReceiveFailed`] if the reply could not be read;
    ///   a receiver that drops the connection instead of answering shows up
    ///   here as [`ProtocolError::Closed`].
    /// - [`TransportError::ReplyTimeout`] if `config.reply_timeout` expires.
    pub async fn send(
        &mut self,
        msg: &Message<F::Payload>,
    ) -> Result<Option<Message<F::Payload>>, TransportError> {
        let result = self.exchange(msg).await;
        if let Err(e) = &result {
            tracing::debug!(peer = %self.peer, error = %e, "sender connection invalidated");
            self.conn = None;
        }
        result
    }

    async fn exchange(
        &mut self,
        msg: &Message<F::Payload>,
    ) -> Result<Option<Message<F::Payload>>, TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;

        conn.encoder
            .encode(msg)
            .await
            .map_err(TransportError::SendFailed)?;

        if !msg.requires_reply() {
            return Ok(None);
        }

        let reply = match self.config.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.decoder.decode())
                .await
                .map_err(|_| TransportError::ReplyTimeout(limit))?,
            None => conn.decoder.decode().await,
        }
        .map_err(TransportError::ReceiveFailed)?;

        Ok(Some(reply))
    }

    /// Shuts down the write side and drops the connection.
    ///
    /// The receiver sees a clean end of stream. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        match conn.encoder.shutdown().await {
            Ok(()) => Ok(()),
            // The peer beat us to it.
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::NotConnected => {
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    /// Returns `true` until the connection is invalidated or closed.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The receiver's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The active configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }
}
