//! The unit of transport: a tag, a payload, and an optional reply slot.

use std::any::Any;
use std::fmt;

use crate::reply::{reply_pair, ReplyHandle, ReplySlot};
use crate::{ProtocolError, Tag};

/// A framed message.
///
/// `P` is the payload representation chosen by the stream's
/// [`PayloadFormat`](crate::PayloadFormat): raw bytes for [`RawMessage`],
/// an optional [`Structured`] value for [`TypedMessage`].
///
/// The reply slot is transient. It is never serialized and is ignored by
/// `PartialEq`, so a decoded request compares equal to the message that was
/// encoded even after the receiver attached a slot to it.
pub struct Message<P = Vec<u8>> {
    tag: Tag,
    payload: P,
    reply: Option<ReplySlot<P>>,
}

/// A message whose payload is an opaque byte sequence.
pub type RawMessage = Message<Vec<u8>>;

/// A message whose payload is a decoded structured value (`None` when the
/// frame carried zero payload bytes).
pub type TypedMessage = Message<Option<Structured>>;

impl<P> Message<P> {
    /// Creates a message without a reply slot.
    pub fn new(tag: u8, payload: P) -> Self {
        Self {
            tag: Tag::new(tag),
            payload,
            reply: None,
        }
    }

    /// Returns the message tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns `true` if the tag says this message expects a reply.
    pub fn requires_reply(&self) -> bool {
        self.tag.requires_reply()
    }

    /// Borrows the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consumes the message and returns its payload.
    ///
    /// An attached reply slot is dropped along with the message.
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Attaches a fresh reply slot if (and only if) the tag requires a reply.
    ///
    /// Returns the receiving half, which the caller awaits to get the
    /// reply. A previously attached slot is replaced, so the old handle
    /// will observe [`ProtocolError::ReplyDropped`].
    pub fn attach_reply_slot(&mut self) -> Option<ReplyHandle<P>> {
        if !self.tag.requires_reply() {
            return None;
        }
        let (slot, handle) = reply_pair();
        self.reply = Some(slot);
        Some(handle)
    }

    /// Returns `true` while a reply slot is attached and unused.
    pub fn has_reply_slot(&self) -> bool {
        self.reply.is_some()
    }

    /// Detaches the reply slot, e.g. to answer after the message itself
    /// has been consumed.
    pub fn take_reply_slot(&mut self) -> Option<ReplySlot<P>> {
        self.reply.take()
    }

    /// Places `reply` into the reply slot.
    ///
    /// # Errors
    /// - [`ProtocolError::NoReplySlot`] if no slot is attached (the tag is
    ///   fire-and-forget, or a reply was already placed).
    /// - [`ProtocolError::ReplyReceiverGone`] if the requester stopped
    ///   waiting.
    pub fn reply(&mut self, reply: Message<P>) -> Result<(), ProtocolError> {
        self.place(Some(reply))
    }

    /// Answers "processed, nothing to send": the receiver writes no frame.
    ///
    /// # Errors
    /// Same as [`reply`](Self::reply).
    pub fn suppress_reply(&mut self) -> Result<(), ProtocolError> {
        self.place(None)
    }

    fn place(&mut self, reply: Option<Message<P>>) -> Result<(), ProtocolError> {
        let slot = self
            .reply
            .take()
            .ok_or(ProtocolError::NoReplySlot(self.tag))?;
        slot.send(reply)
    }
}

impl RawMessage {
    /// Creates a raw message with no payload bytes.
    pub fn empty(tag: u8) -> Self {
        Self::new(tag, Vec::new())
    }
}

impl TypedMessage {
    /// Creates a typed message carrying `value`.
    pub fn typed<T: Any + Send + Sync>(tag: u8, value: T) -> Self {
        Self::new(tag, Some(Structured::new(value)))
    }

    /// Borrows the payload as `T`, if present and of that type.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(Structured::downcast_ref::<T>)
    }
}

impl<P: PartialEq> PartialEq for Message<P> {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.payload == other.payload
    }
}

impl<P: Eq> Eq for Message<P> {}

impl<P: fmt::Debug> fmt::Debug for Message<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("tag", &self.tag)
            .field("payload", &self.payload)
            .field("reply_slot", &self.reply.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Structured
// ---------------------------------------------------------------------------

/// A decoded structured payload of some registered Rust type.
///
/// The concrete type is erased (`dyn Any`) so that one stream can carry a
/// different shape per tag. Use [`downcast_ref`](Self::downcast_ref) or
/// [`downcast`](Self::downcast) to get it back.
pub struct Structured {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Structured {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the wrapped Rust type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Unwraps the value as `T`, handing `self` back on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|value| Self { value, type_name })
    }

    pub(crate) fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.value.as_ref()
    }
}

impl fmt::Debug for Structured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structured")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_reply_slot() {
        let plain = RawMessage::new(200, b"req".to_vec());
        let mut with_slot = RawMessage::new(200, b"req".to_vec());
        let _handle = with_slot.attach_reply_slot();
        assert!(with_slot.has_reply_slot());
        assert_eq!(plain, with_slot);
    }

    #[test]
    fn test_no_slot_for_fire_and_forget() {
        let mut msg = RawMessage::empty(127);
        assert!(msg.attach_reply_slot().is_none());
        assert!(!msg.has_reply_slot());
        assert!(matches!(
            msg.reply(RawMessage::empty(1)),
            Err(ProtocolError::NoReplySlot(tag)) if tag.get() == 127
        ));
    }

    #[tokio::test]
    async fn test_reply_is_single_use() {
        let mut msg = RawMessage::empty(128);
        let handle = msg.attach_reply_slot().unwrap();

        msg.reply(RawMessage::new(5, b"ok".to_vec())).unwrap();
        assert!(matches!(
            msg.suppress_reply(),
            Err(ProtocolError::NoReplySlot(_))
        ));

        let reply = handle.wait().await.unwrap().unwrap();
        assert_eq!(reply.tag(), Tag::new(5));
    }

    #[tokio::test]
    async fn test_reattach_drops_previous_handle() {
        let mut msg = RawMessage::empty(255);
        let first = msg.attach_reply_slot().unwrap();
        let _second = msg.attach_reply_slot().unwrap();
        assert!(matches!(first.wait().await, Err(ProtocolError::ReplyDropped)));
    }

    #[test]
    fn test_typed_payload_downcast() {
        let msg = TypedMessage::typed(3, 42u32);
        assert_eq!(msg.payload_as::<u32>(), Some(&42));
        assert_eq!(msg.payload_as::<i64>(), None);
    }

    #[test]
    fn test_structured_downcast_returns_self_on_mismatch() {
        let value = Structured::new(String::from("hi"));
        let value = value.downcast::<u8>().unwrap_err();
        assert!(value.is::<String>());
        assert_eq!(value.downcast::<String>().unwrap(), "hi");
    }
}
