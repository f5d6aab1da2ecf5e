//! The codec registry: tag → payload shape.
//!
//! Typed streams need to know, for every tag, which Rust type the payload
//! bytes decode into. The registry is that table. It is populated with
//! explicit [`Registry::register`] calls before any traffic flows, then
//! frozen by wrapping it in an `Arc` and handing it to receivers and
//! senders:
//!
//! ```rust
//! use std::sync::Arc;
//! use tagwire_protocol::Registry;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Prepare { ballot: u64 }
//!
//! let mut registry = Registry::new();
//! registry.register::<Prepare>(130);
//! let registry = Arc::new(registry);
//!
//! assert!(registry.lookup(130).is_some());
//! assert!(registry.lookup(131).is_none());
//! ```
//!
//! Once shared, the table can no longer be mutated, so "register every tag
//! before traffic begins" is enforced by the borrow checker rather than by
//! convention.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(feature = "json")]
use crate::JsonCodec;
use crate::{Codec, ProtocolError, Structured, Tag};

type EncodeFn<C> =
    fn(&C, &(dyn Any + Send + Sync)) -> Option<Result<Vec<u8>, ProtocolError>>;
type DecodeFn<C> = fn(&C, &[u8]) -> Result<Structured, ProtocolError>;

/// The registered runtime shape of one tag's payload.
///
/// Holds monomorphized encode/decode functions for the concrete type, so
/// the registry can produce a fresh value of that type from payload bytes
/// without any runtime type discovery.
pub struct Shape<C> {
    type_id: TypeId,
    type_name: &'static str,
    encode: EncodeFn<C>,
    decode: DecodeFn<C>,
}

impl<C: Codec> Shape<C> {
    fn of<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            encode: encode_as::<T, C>,
            decode: decode_as::<T, C>,
        }
    }

    /// Name of the Rust type registered for the tag.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if this shape was registered for `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Encodes a structured payload that must be of this shape.
    ///
    /// # Errors
    /// [`ProtocolError::ShapeMismatch`] if `value` holds another type,
    /// or the codec's encode error.
    pub fn encode(
        &self,
        codec: &C,
        tag: Tag,
        value: &Structured,
    ) -> Result<Vec<u8>, ProtocolError> {
        (self.encode)(codec, value.as_any()).unwrap_or_else(|| {
            Err(ProtocolError::ShapeMismatch {
                tag,
                expected: self.type_name,
                actual: value.type_name(),
            })
        })
    }

    /// Decodes payload bytes into a fresh value of this shape.
    ///
    /// # Errors
    /// The codec's decode error if the bytes don't fit the shape.
    pub fn decode(
        &self,
        codec: &C,
        bytes: &[u8],
    ) -> Result<Structured, ProtocolError> {
        (self.decode)(codec, bytes)
    }
}

fn encode_as<T, C>(
    codec: &C,
    value: &(dyn Any + Send + Sync),
) -> Option<Result<Vec<u8>, ProtocolError>>
where
    T: Serialize + Any,
    C: Codec,
{
    value.downcast_ref::<T>().map(|value| codec.encode(value))
}

fn decode_as<T, C>(codec: &C, bytes: &[u8]) -> Result<Structured, ProtocolError>
where
    T: DeserializeOwned + Any + Send + Sync,
    C: Codec,
{
    codec.decode::<T>(bytes).map(Structured::new)
}

// Manual impls: deriving would demand `C: Clone`/`C: Debug`, but only fn
// pointers are stored.
impl<C> Clone for Shape<C> {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            encode: self.encode,
            decode: self.decode,
        }
    }
}

impl<C> fmt::Debug for Shape<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("type", &self.type_name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Table mapping tags to payload shapes, bound to one [`Codec`].
pub struct Registry<C> {
    codec: C,
    shapes: HashMap<Tag, Shape<C>>,
}

#[cfg(feature = "json")]
impl Registry<JsonCodec> {
    /// Creates an empty registry using [`JsonCodec`].
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

#[cfg(feature = "json")]
impl Default for Registry<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> Registry<C> {
    /// Creates an empty registry using the given codec.
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            shapes: HashMap::new(),
        }
    }

    /// Associates `tag` with the payload type `T`.
    ///
    /// Registering the same tag twice silently replaces the earlier shape
    /// (last writer wins). Keeping tags unique is the caller's job.
    pub fn register<T>(&mut self, tag: u8) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let tag = Tag::new(tag);
        let shape = Shape::of::<T>();
        let type_name = shape.type_name;
        if let Some(previous) = self.shapes.insert(tag, shape) {
            tracing::debug!(
                %tag,
                previous = previous.type_name,
                current = type_name,
                "tag re-registered, replacing shape"
            );
        }
        self
    }

    /// Returns the shape registered for `tag`.
    pub fn lookup(&self, tag: u8) -> Option<&Shape<C>> {
        self.shapes.get(&Tag::new(tag))
    }

    /// Returns the shape registered for `tag`, or
    /// [`ProtocolError::UnregisteredTag`].
    pub fn require(&self, tag: Tag) -> Result<&Shape<C>, ProtocolError> {
        self.shapes
            .get(&tag)
            .ok_or(ProtocolError::UnregisteredTag(tag))
    }

    /// Returns `true` if `tag` has a registered shape.
    pub fn contains(&self, tag: u8) -> bool {
        self.shapes.contains_key(&Tag::new(tag))
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// The codec every shape in this registry encodes and decodes with.
    pub fn codec(&self) -> &C {
        &self.codec
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.shapes.keys().map(|t| t.get()).collect();
        tags.sort_unstable();
        f.debug_struct("Registry").field("tags", &tags).finish()
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct PreAccept {
        instance: u32,
        deps: Vec<u32>,
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Commit {
        instance: u32,
    }

    #[test]
    fn test_lookup_registered_and_unregistered() {
        let mut registry = Registry::new();
        registry.register::<PreAccept>(129);

        let shape = registry.lookup(129).expect("registered");
        assert!(shape.is::<PreAccept>());
        assert!(registry.lookup(130).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut registry = Registry::new();
        registry.register::<PreAccept>(10).register::<Commit>(10);

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(10).unwrap().is::<Commit>());
    }

    #[test]
    fn test_require_unregistered_is_error() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.require(Tag::new(77)),
            Err(ProtocolError::UnregisteredTag(tag)) if tag == Tag::new(77)
        ));
    }

    #[test]
    fn test_shape_roundtrip_through_codec() {
        let mut registry = Registry::new();
        registry.register::<PreAccept>(1);
        let shape = registry.lookup(1).unwrap();

        let value = Structured::new(PreAccept {
            instance: 4,
            deps: vec![1, 2],
        });
        let bytes = shape.encode(registry.codec(), Tag::new(1), &value).unwrap();
        let decoded = shape.decode(registry.codec(), &bytes).unwrap();
        assert_eq!(
            decoded.downcast_ref::<PreAccept>(),
            value.downcast_ref::<PreAccept>()
        );
    }

    #[test]
    fn test_shape_mismatch_on_encode() {
        let mut registry = Registry::new();
        registry.register::<PreAccept>(1);
        let shape = registry.lookup(1).unwrap();

        let wrong = Structured::new(Commit { instance: 1 });
        let err = shape
            .encode(registry.codec(), Tag::new(1), &wrong)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_debug_lists_sorted_tags() {
        let mut registry = Registry::new();
        registry.register::<Commit>(9).register::<PreAccept>(3);
        assert_eq!(format!("{registry:?}"), "Registry { tags: [3, 9] }");
    }
}
