//! Tag-based dispatch on the consumer side.
//!
//! A [`Dispatcher`] maps tags to handler closures and drives an
//! [`Inbox`]: every message goes to the handler registered for its tag,
//! and whatever the handler returns becomes the reply. Consumers that need
//! more control read the inbox directly instead.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), tagwire::TagwireError> {
//! use tagwire::prelude::*;
//!
//! let mut receiver = Receiver::bind("127.0.0.1:7000").await?;
//! receiver.go_start()?;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher
//!     .on(3, |msg: &RawMessage| {
//!         tracing::info!(len = msg.payload().len(), "put");
//!         None
//!     })
//!     .on(200, |msg: &RawMessage| Some(RawMessage::new(1, msg.payload().clone())));
//!
//! dispatcher.run(receiver.inbox()).await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use tagwire_protocol::{Message, Tag};
use tagwire_transport::Inbox;

use crate::TagwireError;

/// A handler: looks at a message and optionally produces its reply.
pub type Handler<P> = Box<dyn Fn(&Message<P>) -> Option<Message<P>> + Send + Sync>;

/// What happened to one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler ran and its answer went back to the requester.
    Replied,
    /// A handler ran and returned nothing for a reply-requiring tag.
    Suppressed,
    /// A handler ran on a fire-and-forget message.
    Handled,
    /// No handler matched. A pending request is dropped, which tears down
    /// the connection it came from.
    Unhandled,
}

/// Routes inbound messages to per-tag handlers.
pub struct Dispatcher<P> {
    handlers: HashMap<Tag, Handler<P>>,
    fallback: Option<Handler<P>>,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    /// Creates a dispatcher with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Registers `handler` for `tag`, replacing any earlier one.
    pub fn on<H>(&mut self, tag: u8, handler: H) -> &mut Self
    where
        H: Fn(&Message<P>) -> Option<Message<P>> + Send + Sync + 'static,
    {
        if self.handlers.insert(Tag::new(tag), Box::new(handler)).is_some() {
            tracing::debug!(tag, "handler replaced");
        }
        self
    }

    /// Registers a handler for tags nobody else claimed.
    pub fn fallback<H>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(&Message<P>) -> Option<Message<P>> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// Returns `true` if a message with `tag` would reach a handler.
    pub fn handles(&self, tag: u8) -> bool {
        self.fallback.is_some() || self.handlers.contains_key(&Tag::new(tag))
    }

    /// Runs the matching handler for `msg` and routes its reply.
    ///
    /// A handler's answer to a fire-and-forget message is discarded.
    ///
    /// # Errors
    /// [`TagwireError::Protocol`] if the reply could not be delivered
    /// because the requester is gone.
    pub fn dispatch(&self, mut msg: Message<P>) -> Result<Dispatched, TagwireError> {
        let tag = msg.tag();
        let Some(handler) = self.handlers.get(&tag).or(self.fallback.as_ref()) else {
            tracing::warn!(%tag, "no handler for tag, message dropped");
            return Ok(Dispatched::Unhandled);
        };

        let answer = handler(&msg);
        if !msg.has_reply_slot() {
            if answer.is_some() {
                tracing::debug!(%tag, "reply to fire-and-forget message discarded");
            }
            return Ok(Dispatched::Handled);
        }

        match answer {
            Some(reply) => {
                msg.reply(reply)?;
                Ok(Dispatched::Replied)
            }
            None => {
                msg.suppress_reply()?;
                Ok(Dispatched::Suppressed)
            }
        }
    }

    /// Dispatches messages from `inbox` until the queue closes.
    ///
    /// A receiver keeps its queue open for as long as it lives, so this is
    /// usually spawned and left running. Returns the number of messages
    /// that reached a handler.
    pub async fn run(&self, inbox: Inbox<P>) -> usize {
        let mut handled = 0;
        while let Some(msg) = inbox.recv().await {
            match self.dispatch(msg) {
                Ok(Dispatched::Unhandled) => {}
                Ok(_) => handled += 1,
                Err(e) => {
                    handled += 1;
                    tracing::warn!(error = %e, "reply not delivered");
                }
            }
        }
        tracing::debug!(handled, "inbound queue closed, dispatcher exiting");
        handled
    }
}

impl<P: Send + Sync + 'static> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<u8> = self.handlers.keys().map(|tag| tag.get()).collect();
        tags.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("tags", &tags)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tagwire_protocol::RawMessage;
    use tagwire_transport::Receiver;

    use super::*;

    fn echo(msg: &RawMessage) -> Option<RawMessage> {
        Some(RawMessage::new(1, msg.payload().clone()))
    }

    #[tokio::test]
    async fn test_dispatch_replies_through_slot() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(200, echo);

        let mut msg = RawMessage::new(200, b"hi".to_vec());
        let handle = msg.attach_reply_slot().unwrap();

        assert_eq!(dispatcher.dispatch(msg).unwrap(), Dispatched::Replied);
        let reply = handle.wait().await.unwrap().unwrap();
        assert_eq!(reply.payload(), b"hi");
    }

    #[tokio::test]
    async fn test_dispatch_suppresses_when_handler_returns_none() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(200, |_: &RawMessage| None);

        let mut msg = RawMessage::empty(200);
        let handle = msg.attach_reply_slot().unwrap();

        assert_eq!(dispatcher.dispatch(msg).unwrap(), Dispatched::Suppressed);
        assert!(handle.wait().await.unwrap().is_none());
    }

    #[test]
    fn test_fire_and_forget_answer_is_discarded() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(3, echo);
        assert_eq!(
            dispatcher.dispatch(RawMessage::empty(3)).unwrap(),
            Dispatched::Handled
        );
    }

    #[tokio::test]
    async fn test_unhandled_request_drops_slot() {
        let dispatcher = Dispatcher::<Vec<u8>>::new();
        assert!(!dispatcher.handles(200));

        let mut msg = RawMessage::empty(200);
        let handle = msg.attach_reply_slot().unwrap();
        assert_eq!(dispatcher.dispatch(msg).unwrap(), Dispatched::Unhandled);
        assert!(handle.wait().await.is_err());
    }

    #[test]
    fn test_fallback_catches_unclaimed_tags() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let mut dispatcher = Dispatcher::new();
        dispatcher.on(3, |_: &RawMessage| None).fallback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        assert!(dispatcher.handles(99));
        dispatcher.dispatch(RawMessage::empty(99)).unwrap();
        dispatcher.dispatch(RawMessage::empty(3)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_lists_sorted_tags() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(9, echo).on(3, echo);
        assert_eq!(
            format!("{dispatcher:?}"),
            "Dispatcher { tags: [3, 9], fallback: false }"
        );
    }

    #[tokio::test]
    async fn test_run_serves_local_deliveries() {
        let receiver = Receiver::new();
        let inbox = receiver.inbox();

        let mut dispatcher = Dispatcher::new();
        dispatcher.on(200, echo);
        let dispatcher = Arc::new(dispatcher);
        let runner = Arc::clone(&dispatcher);
        tokio::spawn(async move { runner.run(inbox).await });

        let reply = receiver
            .deliver_locally(RawMessage::new(200, b"loop".to_vec()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.payload(), b"loop");
    }
}
