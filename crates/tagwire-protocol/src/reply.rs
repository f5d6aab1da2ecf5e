//! One-shot reply slots.
//!
//! A reply slot is how a consumer answers a request without knowing
//! anything about the connection it came from. When the receiving side
//! sees a reply-requiring tag it calls [`Message::attach_reply_slot`]:
//! the message keeps the sending half ([`ReplySlot`]) and the serve loop
//! keeps the receiving half ([`ReplyHandle`]). Whoever consumes the message
//! places exactly one reply, and the serve loop writes it back on the
//! socket the request arrived on.
//!
//! The value carried through the slot is `Option<Message<P>>`: `None`
//! means "processed, nothing to send back", which suppresses the reply
//! frame entirely.
//!
//! [`Message::attach_reply_slot`]: crate::Message::attach_reply_slot

use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::{Message, ProtocolError};

/// Creates a connected slot/handle pair.
pub(crate) fn reply_pair<P>() -> (ReplySlot<P>, ReplyHandle<P>) {
    let (tx, rx) = oneshot::channel();
    (ReplySlot { tx }, ReplyHandle { rx })
}

/// The sending half of a reply slot. Single use.
pub struct ReplySlot<P> {
    tx: oneshot::Sender<Option<Message<P>>>,
}

impl<P> ReplySlot<P> {
    /// Places the reply. `None` suppresses the reply frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::ReplyReceiverGone`] if nobody is waiting
    /// any more (the connection was closed or the local caller gave up).
    pub fn send(self, reply: Option<Message<P>>) -> Result<(), ProtocolError> {
        self.tx
            .send(reply)
            .map_err(|_| ProtocolError::ReplyReceiverGone)
    }

    /// Returns `true` if the waiting side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<P> fmt::Debug for ReplySlot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySlot")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// The receiving half of a reply slot.
pub struct ReplyHandle<P> {
    rx: oneshot::Receiver<Option<Message<P>>>,
}

impl<P> ReplyHandle<P> {
    /// Waits for the reply.
    ///
    /// # Errors
    /// Returns [`ProtocolError::ReplyDropped`] if the slot was dropped
    /// without a reply being placed.
    pub async fn wait(self) -> Result<Option<Message<P>>, ProtocolError> {
        self.rx.await.map_err(|_| ProtocolError::ReplyDropped)
    }

    /// Waits for the reply for at most `limit`; a `limit` of `None` waits
    /// forever.
    ///
    /// Returns `None` if the limit elapsed before anything was placed.
    pub async fn wait_for(
        self,
        limit: Option<Duration>,
    ) -> Option<Result<Option<Message<P>>, ProtocolError>> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.wait()).await.ok(),
            None => Some(self.wait().await),
        }
    }
}

impl<P> fmt::Debug for ReplyHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle").finish_non_exhaustive()
    }
}
