//! The inbound queue shared by connection loops and consumers.
//!
//! Connection loops (and local producers) push into a bounded
//! `tokio::sync::mpsc` channel; consumers pull from it through an
//! [`Inbox`]. The receiving half sits behind a `tokio::sync::Mutex` so any
//! number of consumer tasks can share one queue: whoever holds the lock
//! gets the next message, in FIFO order.

use std::sync::Arc;

use tagwire_protocol::Message;
use tokio::sync::{mpsc, Mutex};

use crate::TransportError;

/// Creates a bounded queue and returns both ends.
pub(crate) fn queue<P>(capacity: usize) -> (LocalSender<P>, Inbox<P>) {
    let (tx, rx) = mpsc::channel(capacity);
    let producers = tx.downgrade();
    (
        LocalSender { tx },
        Inbox {
            rx: Arc::new(Mutex::new(rx)),
            producers,
        },
    )
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// Consumer handle for a receiver's inbound queue.
///
/// Cheap to clone; clones share the same queue.
pub struct Inbox<P> {
    rx: Arc<Mutex<mpsc::Receiver<Message<P>>>>,
    // Weak so the inbox never keeps the queue open by itself.
    producers: mpsc::WeakSender<Message<P>>,
}

impl<P> Clone for Inbox<P> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            producers: self.producers.clone(),
        }
    }
}

impl<P> Inbox<P> {
    /// Waits for the next message.
    ///
    /// Returns `None` once the queue is closed: the receiver and every
    /// connection loop and [`LocalSender`] are gone and the queue has been
    /// drained.
    pub async fn recv(&self) -> Option<Message<P>> {
        self.rx.lock().await.recv().await
    }

    /// Returns the next message if one is ready, without waiting.
    ///
    /// Also returns `None` while another consumer is parked in
    /// [`recv`](Self::recv); that consumer is first in line for the next
    /// message anyway.
    pub fn try_recv(&self) -> Option<Message<P>> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Number of messages currently queued.
    ///
    /// Counted from the producer side, so a consumer parked in
    /// [`recv`](Self::recv) does not hide queued messages.
    pub fn len(&self) -> usize {
        match self.producers.upgrade() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            // Every producer is gone; only the consumer side can tell.
            None => self.rx.try_lock().map(|rx| rx.len()).unwrap_or(0),
        }
    }

    /// Returns `true` if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// LocalSender
// ---------------------------------------------------------------------------

/// Producer handle that injects messages straight into the inbound queue,
/// bypassing the network.
///
/// Cheap to clone. In-process producers use it to talk to consumers with
/// the same request/reply idiom remote senders get.
pub struct LocalSender<P> {
    tx: mpsc::Sender<Message<P>>,
}

impl<P> Clone for LocalSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> LocalSender<P> {
    /// Delivers `msg` to the queue.
    ///
    /// If the tag requires a reply, a reply slot is attached and this call
    /// waits for a consumer to answer, returning the reply (`None` if the
    /// consumer suppressed it). Fire-and-forget messages return `Ok(None)`
    /// as soon as they are queued.
    ///
    /// Like a connection loop, this waits while the queue is full.
    ///
    /// # Errors
    /// - [`TransportError::Shutdown`] if every consumer handle is gone.
    /// - [`TransportError::Reply`] if the consumer dropped the message
    ///   without answering.
    pub async fn deliver(
        &self,
        mut msg: Message<P>,
    ) -> Result<Option<Message<P>>, TransportError> {
        let reply = msg.attach_reply_slot();
        self.publish(msg).await?;
        match reply {
            Some(handle) => handle.wait().await.map_err(TransportError::Reply),
            None => Ok(None),
        }
    }

    /// Pushes `msg` as-is, waiting while the queue is full.
    pub(crate) async fn publish(&self, msg: Message<P>) -> Result<(), TransportError> {
        self.tx.send(msg).await.map_err(|_| TransportError::Shutdown)
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}
