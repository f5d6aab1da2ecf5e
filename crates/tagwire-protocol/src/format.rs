//! Payload formats: what a frame's payload bytes mean.
//!
//! Every stream is either raw (payload bytes are handed to the application
//! untouched) or typed (payload bytes are decoded through the
//! [`Registry`]). The frame encoder and decoder are generic over
//! [`PayloadFormat`], so the same framing, receiver, and sender code serves
//! both.

use std::borrow::Cow;

use crate::{Codec, ProtocolError, Registry, Structured, Tag};

/// Converts between a message payload and the bytes inside a frame.
pub trait PayloadFormat: Send + Sync + 'static {
    /// The in-memory payload representation.
    type Payload: Send + Sync + 'static;

    /// Produces the payload bytes for an outbound frame.
    ///
    /// An empty result means a zero-length frame.
    fn encode_payload<'a>(
        &self,
        tag: Tag,
        payload: &'a Self::Payload,
    ) -> Result<Cow<'a, [u8]>, ProtocolError>;

    /// Builds a payload from an inbound frame's bytes.
    fn decode_payload(
        &self,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<Self::Payload, ProtocolError>;
}

/// Opaque byte payloads. No codec is involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormat;

impl PayloadFormat for RawFormat {
    type Payload = Vec<u8>;

    fn encode_payload<'a>(
        &self,
        _tag: Tag,
        payload: &'a Vec<u8>,
    ) -> Result<Cow<'a, [u8]>, ProtocolError> {
        Ok(Cow::Borrowed(payload.as_slice()))
    }

    fn decode_payload(
        &self,
        _tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, ProtocolError> {
        Ok(bytes)
    }
}

/// Typed payloads, one registered shape per tag.
///
/// The tag is looked up even for zero-length frames: an unregistered tag is
/// an error regardless of whether a payload follows.
impl<C: Codec> PayloadFormat for Registry<C> {
    type Payload = Option<Structured>;

    fn encode_payload<'a>(
        &self,
        tag: Tag,
        payload: &'a Option<Structured>,
    ) -> Result<Cow<'a, [u8]>, ProtocolError> {
        let shape = self.require(tag)?;
        match payload {
            Some(value) => shape.encode(self.codec(), tag, value).map(Cow::Owned),
            None => Ok(Cow::Borrowed(&[])),
        }
    }

    fn decode_payload(
        &self,
        tag: Tag,
        bytes: Vec<u8>,
    ) -> Result<Option<Structured>, ProtocolError> {
        let shape = self.require(tag)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        shape.decode(self.codec(), &bytes).map(Some)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Accept {
        ballot: u64,
    }

    fn registry() -> Registry<crate::JsonCodec> {
        let mut registry = Registry::new();
        registry.register::<Accept>(140);
        registry
    }

    #[test]
    fn test_raw_format_passes_bytes_through() {
        let payload = vec![1, 2, 3];
        let encoded = RawFormat.encode_payload(Tag::new(1), &payload).unwrap();
        assert!(matches!(encoded, Cow::Borrowed(_)));
        let decoded = RawFormat
            .decode_payload(Tag::new(1), encoded.into_owned())
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_typed_empty_payload_is_none() {
        let registry = registry();
        let encoded = registry.encode_payload(Tag::new(140), &None).unwrap();
        assert!(encoded.is_empty());
        let decoded = registry.decode_payload(Tag::new(140), Vec::new()).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_typed_unregistered_tag_even_when_empty() {
        let registry = registry();
        assert!(matches!(
            registry.decode_payload(Tag::new(141), Vec::new()),
            Err(ProtocolError::UnregisteredTag(_))
        ));
        assert!(matches!(
            registry.encode_payload(Tag::new(141), &None),
            Err(ProtocolError::UnregisteredTag(_))
        ));
    }

    #[test]
    fn test_typed_codec_failure_is_decode_error() {
        let registry = registry();
        assert!(matches!(
            registry.decode_payload(Tag::new(140), b"not json".to_vec()),
            Err(ProtocolError::Decode(_))
        ));
    }
}
