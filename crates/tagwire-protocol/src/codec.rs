//! Codec trait and implementations for structured payloads.
//!
//! A "codec" (coder/decoder) converts between Rust values and the bytes
//! that fill a frame's payload. The frame layer doesn't care HOW a typed
//! payload is serialized; it only needs something that implements
//! [`Codec`], reached through the [`Registry`](crate::Registry). Raw-byte
//! streams never touch a codec at all.
//!
//! We provide [`JsonCodec`] out of the box. A binary codec can be swapped
//! in by implementing the trait and building the registry with it; nothing
//! else changes.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust values to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the registry owning the codec is shared by every
///   connection task, on whatever worker thread Tokio picks.
/// - `'static` → the codec owns everything it needs, so it can live
///   inside long-lived tasks.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded value
/// doesn't borrow from the payload buffer, which is dropped right after
/// decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into payload bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails. Any error
    /// type converts through [`ProtocolError::encode`].
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes payload bytes into a fresh value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is human-readable, which makes captured traffic easy to inspect.
/// The tradeoff is size.
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use tagwire_protocol::{Codec, JsonCodec, Tag};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Tag::new(7)).unwrap();
/// assert_eq!(bytes, b"7");
///
/// let decoded: Tag = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Tag::new(7));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Vote {
        ballot: u32,
        granted: bool,
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonCodec;
        let vote = Vote {
            ballot: 9,
            granted: true,
        };
        let bytes = codec.encode(&vote).unwrap();
        let back: Vote = codec.decode(&bytes).unwrap();
        assert_eq!(back, vote);
    }

    #[test]
    fn test_json_decode_wrong_shape() {
        let codec = JsonCodec;
        let result: Result<Vote, _> = codec.decode(b"[1,2,3]");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}

#[cfg(test)]
mod custom_codec_tests {
    use super::*;
    use crate::{PayloadFormat, Registry, Tag};

    /// Stands in for a binary codec with its own error type.
    struct RejectingCodec;

    #[derive(Debug, thiserror::Error)]
    #[error("bad varint at offset {0}")]
    struct VarintError(usize);

    impl Codec for RejectingCodec {
        fn encode<T: Serialize>(&self, _value: &T) -> Result<Vec<u8>, ProtocolError> {
            Err(ProtocolError::encode(VarintError(0)))
        }

        fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
            Err(ProtocolError::decode(VarintError(data.len())))
        }
    }

    #[test]
    fn test_non_json_codec_reports_decode_failure() {
        let mut registry = Registry::with_codec(RejectingCodec);
        registry.register::<u32>(140);

        let err = registry
            .decode_payload(Tag::new(140), vec![0xff, 0xff])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert_eq!(err.to_string(), "decode failed: bad varint at offset 2");
    }

    #[test]
    fn test_non_json_codec_reports_encode_failure() {
        let mut registry = Registry::with_codec(RejectingCodec);
        registry.register::<u32>(140);

        let payload = Some(crate::Structured::new(7u32));
        let err = registry.encode_payload(Tag::new(140), &payload).unwrap_err();
        assert!(matches!(err, ProtocolError::Encode(_)));
    }
}
