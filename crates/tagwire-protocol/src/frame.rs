//! Frame encoding and decoding over async byte streams.
//!
//! Wire layout, one frame per message, little-endian:
//!
//! ```text
//! +--------+------------------+---------------------+
//! | tag:1  | payload_len:4 LE | payload:payload_len |
//! +--------+------------------+---------------------+
//! ```
//!
//! There is no version byte, checksum, or compression. A zero
//! `payload_len` is a valid frame with an empty payload.

use std::sync::Arc;

use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

use crate::{Message, PayloadFormat, ProtocolError, Tag};

/// Size of the fixed frame header: 1 tag byte + 4 length bytes.
pub const HEADER_LEN: usize = 5;

/// Default upper bound on payload length accepted by decoders and encoders.
///
/// A garbage header could otherwise announce a ~4 GiB payload and make the
/// decoder allocate it.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Encodes one frame into a byte vector.
///
/// # Errors
/// [`ProtocolError::PayloadTooLarge`] if `payload` does not fit the 32-bit
/// length field.
pub fn encode_frame(tag: Tag, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = checked_len(payload.len(), u32::MAX as usize)?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(tag.get());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn checked_len(len: usize, max: usize) -> Result<u32, ProtocolError> {
    let max = max.min(u32::MAX as usize);
    if len > max {
        return Err(ProtocolError::PayloadTooLarge { len, max });
    }
    // `len <= u32::MAX` was just checked.
    Ok(len as u32)
}

// ---------------------------------------------------------------------------
// FrameEncoder
// ---------------------------------------------------------------------------

/// Writes messages as frames to an async byte sink.
///
/// Output is buffered and flushed once per frame, so a frame either leaves
/// in full or the call fails. After a failure the stream state is
/// undefined and the caller must drop the connection.
pub struct FrameEncoder<W, F> {
    writer: BufWriter<W>,
    format: Arc<F>,
    max_payload_len: usize,
}

impl<W, F> FrameEncoder<W, F>
where
    W: AsyncWrite + Unpin,
    F: PayloadFormat,
{
    /// Wraps `writer`, encoding payloads with `format`.
    pub fn new(writer: W, format: Arc<F>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }

    /// Sets the largest payload this encoder will write.
    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }

    /// Encodes `msg`, writes it, and flushes.
    ///
    /// # Errors
    /// Payload encoding errors from the format, `PayloadTooLarge`, or `Io`.
    pub async fn encode(
        &mut self,
        msg: &Message<F::Payload>,
    ) -> Result<(), ProtocolError> {
        let tag = msg.tag();
        let payload = self.format.encode_payload(tag, msg.payload())?;
        let len = checked_len(payload.len(), self.max_payload_len)?;

        self.writer.write_u8(tag.get()).await?;
        self.writer.write_u32_le(len).await?;
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;

        tracing::trace!(%tag, len, "frame written");
        Ok(())
    }

    /// Flushes and shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Borrows the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Returns the underlying writer. Unflushed bytes are lost.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Reads frames from an async byte source and turns them into messages.
///
/// [`decode`](Self::decode) is not cancellation-safe: dropping its future
/// mid-frame leaves the stream misaligned, so the decoder must be discarded
/// afterwards.
pub struct FrameDecoder<R, F> {
    reader: BufReader<R>,
    format: Arc<F>,
    max_payload_len: usize,
}

impl<R, F> FrameDecoder<R, F>
where
    R: AsyncRead + Unpin,
    F: PayloadFormat,
{
    /// Wraps `reader`, decoding payloads with `format`.
    pub fn new(reader: R, format: Arc<F>) -> Self {
        Self {
            reader: BufReader::new(reader),
            format,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }

    /// Sets the largest payload this decoder will accept.
    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }

    /// Reads exactly one frame and decodes it into a fresh message.
    ///
    /// # Errors
    /// - [`ProtocolError::Closed`] if the stream ended before the first
    ///   header byte (clean close).
    /// - [`ProtocolError::Truncated`] if it ended inside the frame.
    /// - [`ProtocolError::PayloadTooLarge`] if the announced length exceeds
    ///   the configured maximum.
    /// - Payload errors from the format (e.g. `UnregisteredTag`, `Decode`).
    pub async fn decode(&mut self) -> Result<Message<F::Payload>, ProtocolError> {
        let mut tag = [0u8; 1];
        if self.reader.read(&mut tag).await? == 0 {
            return Err(ProtocolError::Closed);
        }
        let tag = Tag::new(tag[0]);

        let mut len = [0u8; 4];
        read_full(&mut self.reader, &mut len).await?;
        let len = u32::from_le_bytes(len) as usize;
        if len > self.max_payload_len {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: self.max_payload_len,
            });
        }

        let mut bytes = vec![0u8; len];
        read_full(&mut self.reader, &mut bytes).await?;
        tracing::trace!(%tag, len, "frame read");

        let payload = self.format.decode_payload(tag, bytes)?;
        Ok(Message::new(tag.get(), payload))
    }

    /// Borrows the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Returns the underlying reader. Buffered, unread bytes are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

/// Like `read_exact`, but reports how many bytes were still missing when
/// the stream ended.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::Truncated {
                expected: buf.len() - filled,
            });
        }
        filled += n;
    }
    Ok(())
}
