//! The receiving side: accept loop, per-connection serve loops, and the
//! inbound queue they feed.
//!
//! ```text
//!                 ┌──────────── serve loop (one task per connection) ──┐
//! TcpListener ──► │ decode → attach reply slot → publish → await reply │ ──► Inbox
//!   accept loop   │            ▲                               │       │
//!                 │            └──── encode reply ◄────────────┘       │
//!                 └────────────────────────────────────────────────────┘
//! ```
//!
//! A connection handles one request at a time: after publishing a
//! reply-requiring message it waits for the answer before reading the next
//! frame. Connections share nothing but the inbound queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tagwire_protocol::{
    FrameDecoder, FrameEncoder, Message, PayloadFormat, ProtocolError, RawFormat,
    Registry,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::inbox::{queue, Inbox, LocalSender};
use crate::{ConnectionId, ReceiverConfig, TransportError};

/// A receiver whose payloads are decoded through a [`Registry`].
pub type TypedReceiver<C> = Receiver<Registry<C>>;

// ---------------------------------------------------------------------------
// Stop signalling
// ---------------------------------------------------------------------------

/// Stops a running receiver from anywhere.
///
/// Obtained from [`Receiver::stop_handle`]. Useful when the accept loop runs
/// in the caller's task via [`Receiver::start`], which holds `&mut` on the
/// receiver until it returns.
#[derive(Clone)]
pub struct StopHandle {
    epoch: Arc<watch::Sender<u64>>,
}

impl StopHandle {
    /// Signals the accept loop and every live connection loop to exit.
    pub fn stop(&self) {
        self.epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

/// Observed by loops belonging to one run of the receiver.
///
/// Every stop bumps the epoch, so a loop only has to watch for the value
/// to move away from the one it started with. A dropped receiver closes
/// the channel, which counts as a stop too.
#[derive(Clone)]
struct StopSignal {
    rx: watch::Receiver<u64>,
    epoch: u64,
}

impl StopSignal {
    fn new(tx: &watch::Sender<u64>, epoch: u64) -> Self {
        Self {
            rx: tx.subscribe(),
            epoch,
        }
    }

    async fn stopped(&mut self) {
        let epoch = self.epoch;
        let _ = self.rx.wait_for(|current| *current != epoch).await;
    }
}

// ---------------------------------------------------------------------------
// ReceiverBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Receiver`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), tagwire_transport::TransportError> {
/// use std::time::Duration;
/// use tagwire_transport::ReceiverBuilder;
///
/// let mut receiver = ReceiverBuilder::new()
///     .queue_capacity(64)
///     .reply_timeout(Duration::from_secs(1))
///     .bind("127.0.0.1:7000")
///     .await?;
/// receiver.go_start()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReceiverBuilder {
    config: ReceiverConfig,
}

impl ReceiverBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the inbound queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Bounds the wait for a consumer's reply.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = Some(timeout);
        self
    }

    /// Sets the largest accepted payload.
    pub fn max_payload_len(mut self, max: usize) -> Self {
        self.config.max_payload_len = max;
        self
    }

    /// Sets `TCP_NODELAY` on accepted connections.
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Builds a raw-payload receiver that is not yet listening.
    pub fn build(self) -> Receiver<RawFormat> {
        Receiver::with_format(Arc::new(RawFormat), self.config)
    }

    /// Builds a receiver using `format`, not yet listening.
    pub fn build_with_format<F: PayloadFormat>(self, format: Arc<F>) -> Receiver<F> {
        Receiver::with_format(format, self.config)
    }

    /// Builds a raw-payload receiver and binds it to `addr`.
    pub async fn bind(self, addr: &str) -> Result<Receiver<RawFormat>, TransportError> {
        let mut receiver = self.build();
        receiver.listen(addr).await?;
        Ok(receiver)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// State shared by the accept loop and every connection loop.
struct Shared<F: PayloadFormat> {
    format: Arc<F>,
    config: ReceiverConfig,
    queue: LocalSender<F::Payload>,
}

/// Owns a listening socket and turns incoming frames into messages on an
/// inbound queue.
///
/// Lifecycle: [`listen`](Self::listen) → [`start`](Self::start) or
/// [`go_start`](Self::go_start) → [`stop`](Self::stop). A stopped receiver
/// can listen and start again, on the same address or another one; the
/// inbound queue survives restarts.
pub struct Receiver<F: PayloadFormat = RawFormat> {
    shared: Arc<Shared<F>>,
    inbox: Inbox<F::Payload>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    epoch: Arc<watch::Sender<u64>>,
    listen_epoch: u64,
    accept_task: Option<JoinHandle<()>>,
}

impl Receiver<RawFormat> {
    /// Creates a raw-payload receiver with default settings.
    pub fn new() -> Self {
        Self::with_format(Arc::new(RawFormat), ReceiverConfig::default())
    }

    /// Creates a raw-payload receiver and binds it to `addr`.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        ReceiverBuilder::new().bind(addr).await
    }

    /// Returns a builder.
    pub fn builder() -> ReceiverBuilder {
        ReceiverBuilder::new()
    }
}

impl Default for Receiver<RawFormat> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PayloadFormat> Receiver<F> {
    /// Creates a receiver decoding payloads with `format`.
    pub fn with_format(format: Arc<F>, config: ReceiverConfig) -> Self {
        let config = config.validated();
        let (local, inbox) = queue(config.queue_capacity);
        let (epoch, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                format,
                config,
                queue: local,
            }),
            inbox,
            listener: None,
            local_addr: None,
            epoch: Arc::new(epoch),
            listen_epoch: 0,
            accept_task: None,
        }
    }

    /// Binds the listening socket.
    ///
    /// Returns the bound address, which is handy when `addr` uses port 0.
    ///
    /// # Errors
    /// - [`TransportError::AlreadyRunning`] if the accept loop is running.
    /// - [`TransportError::Bind`] if the address can't be bound.
    pub async fn listen(&mut self, addr: &str) -> Result<SocketAddr, TransportError> {
        if self.is_running() {
            return Err(TransportError::AlreadyRunning);
        }
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        tracing::info!(%local_addr, "receiver listening");

        self.listener = Some(listener);
        self.local_addr = Some(local_addr);
        self.listen_epoch = *self.epoch.borrow();
        Ok(local_addr)
    }

    /// The address the receiver is bound to, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Runs the accept loop in the current task until stopped.
    ///
    /// Stop it through a [`StopHandle`] taken beforehand.
    ///
    /// # Errors
    /// [`TransportError::NotListening`] without a prior successful
    /// [`listen`](Self::listen).
    pub async fn start(&mut self) -> Result<(), TransportError> {
        let listener = self.listener.take().ok_or(TransportError::NotListening)?;
        let stop = StopSignal::new(&self.epoch, self.listen_epoch);
        accept_loop(listener, Arc::clone(&self.shared), stop).await;
        self.local_addr = None;
        Ok(())
    }

    /// Spawns the accept loop onto the Tokio runtime and returns at once.
    ///
    /// # Errors
    /// [`TransportError::NotListening`] without a prior successful
    /// [`listen`](Self::listen).
    pub fn go_start(&mut self) -> Result<(), TransportError> {
        let listener = self.listener.take().ok_or(TransportError::NotListening)?;
        let stop = StopSignal::new(&self.epoch, self.listen_epoch);
        let shared = Arc::clone(&self.shared);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, shared, stop)));
        Ok(())
    }

    /// Returns `true` while a spawned accept loop is running.
    pub fn is_running(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops accepting, closes the listening socket, and cancels every
    /// live connection loop.
    ///
    /// Waits for a spawned accept loop to exit, so the address is free to
    /// bind again once this returns. Messages already queued stay in the
    /// inbox; requests still waiting for a reply are abandoned.
    pub async fn stop(&mut self) {
        self.stop_handle().stop();
        self.listener = None;
        self.local_addr = None;
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "accept loop ended abnormally");
            }
        }
    }

    /// Returns a handle that stops the current run from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            epoch: Arc::clone(&self.epoch),
        }
    }

    /// Returns a consumer handle on the inbound queue.
    pub fn inbox(&self) -> Inbox<F::Payload> {
        self.inbox.clone()
    }

    /// Returns a producer handle for in-process delivery.
    pub fn local_sender(&self) -> LocalSender<F::Payload> {
        self.shared.queue.clone()
    }

    /// Waits for the next inbound message.
    ///
    /// The receiver keeps its own producer handle, so while `self` is alive
    /// this never returns `None`.
    pub async fn recv(&self) -> Option<Message<F::Payload>> {
        self.inbox.recv().await
    }

    /// Returns the next inbound message if one is ready.
    pub fn try_recv(&self) -> Option<Message<F::Payload>> {
        self.inbox.try_recv()
    }

    /// Delivers `msg` to this receiver's consumers without the network.
    ///
    /// See [`LocalSender::deliver`].
    pub async fn deliver_locally(
        &self,
        msg: Message<F::Payload>,
    ) -> Result<Option<Message<F::Payload>>, TransportError> {
        self.shared.queue.deliver(msg).await
    }

    /// The active configuration.
    pub fn config(&self) -> &ReceiverConfig {
        &self.shared.config
    }
}

impl<F: PayloadFormat> Drop for Receiver<F> {
    fn drop(&mut self) {
        // Connection loops hold their own subscriptions; bumping the epoch
        // tells them to exit even though the sender itself may outlive us
        // through outstanding StopHandles.
        self.stop_handle().stop();
    }
}

/// Delivers `msg` to `receiver`'s consumers, bypassing the network.
///
/// Attaches a reply slot when the tag requires one and waits for the
/// answer; fire-and-forget messages return `Ok(None)` once queued.
pub async fn deliver_locally<F: PayloadFormat>(
    receiver: &Receiver<F>,
    msg: Message<F::Payload>,
) -> Result<Option<Message<F::Payload>>, TransportError> {
    receiver.deliver_locally(msg).await
}

// ---------------------------------------------------------------------------
// Accept and serve loops
// ---------------------------------------------------------------------------

async fn accept_loop<F: PayloadFormat>(
    listener: TcpListener,
    shared: Arc<Shared<F>>,
    mut stop: StopSignal,
) {
    tracing::debug!("accept loop running");

    loop {
        let accepted = tokio::select! {
            _ = stop.stopped() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if shared.config.nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                    }
                }
                let id = ConnectionId::next();
                tracing::debug!(%id, %peer, "accepted connection");

                let shared = Arc::clone(&shared);
                let stop = stop.clone();
                tokio::spawn(async move {
                    match serve_connection(stream, id, shared, stop).await {
                        Ok(()) => tracing::debug!(%id, "connection closed"),
                        Err(e) => {
                            tracing::warn!(%id, %peer, error = %e, "connection dropped")
                        }
                    }
                });
            }
            // Every accept error is treated as transient; only the stop
            // signal ends the loop.
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    }

    tracing::info!("receiver stopped accepting");
}

/// Serves one connection until the peer closes it, an error occurs, or the
/// receiver stops.
///
/// `Ok(())` covers the quiet endings: the peer closed on a frame boundary or
/// the receiver stopped. Everything else is returned for logging.
async fn serve_connection<F: PayloadFormat>(
    stream: TcpStream,
    id: ConnectionId,
    shared: Arc<Shared<F>>,
    mut stop: StopSignal,
) -> Result<(), TransportError> {
    let (read, write) = stream.into_split();
    let max = shared.config.max_payload_len;
    let mut decoder =
        FrameDecoder::new(read, Arc::clone(&shared.format)).with_max_payload_len(max);
    let mut encoder =
        FrameEncoder::new(write, Arc::clone(&shared.format)).with_max_payload_len(max);

    loop {
        // --- Step 1: Decode one frame ---
        let decoded = tokio::select! {
            _ = stop.stopped() => return Ok(()),
            decoded = decoder.decode() => decoded,
        };
        let mut msg = match decoded {
            Ok(msg) => msg,
            Err(ProtocolError::Closed) => return Ok(()),
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        };
        let tag = msg.tag();
        tracing::trace!(%id, %tag, "message received");

        // --- Step 2: Attach a reply slot and publish ---
        let reply = msg.attach_reply_slot();
        tokio::select! {
            _ = stop.stopped() => return Ok(()),
            published = shared.queue.publish(msg) => published?,
        }

        let Some(reply) = reply else {
            continue;
        };

        // --- Step 3: Wait for the consumer's answer ---
        let outcome = tokio::select! {
            _ = stop.stopped() => return Ok(()),
            outcome = reply.wait_for(shared.config.reply_timeout) => outcome,
        };
        match outcome {
            Some(Ok(Some(reply))) => {
                encoder
                    .encode(&reply)
                    .await
                    .map_err(TransportError::SendFailed)?;
                tracing::trace!(%id, request = %tag, reply = %reply.tag(), "reply sent");
            }
            Some(Ok(None)) => {
                tracing::trace!(%id, %tag, "reply suppressed");
            }
            Some(Err(e)) => return Err(TransportError::Reply(e)),
            None => {
                // `wait_for` only gives up when a limit is configured.
                let limit = shared.config.reply_timeout.unwrap_or_default();
                return Err(TransportError::ReplyTimeout(limit));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_without_listen_fails() {
        let mut receiver = Receiver::new();
        assert!(matches!(
            receiver.start().await,
            Err(TransportError::NotListening)
        ));
        assert!(matches!(
            receiver.go_start(),
            Err(TransportError::NotListening)
        ));
    }

    #[tokio::test]
    async fn test_listen_reports_bound_port() {
        let mut receiver = Receiver::new();
        let addr = receiver.listen("127.0.0.1:0").await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(receiver.local_addr(), Some(addr));
    }

    #[tokio::test]
    async fn test_listen_while_running_fails() {
        let mut receiver = Receiver::bind("127.0.0.1:0").await.unwrap();
        receiver.go_start().unwrap();
        assert!(receiver.is_running());
        assert!(matches!(
            receiver.listen("127.0.0.1:0").await,
            Err(TransportError::AlreadyRunning)
        ));
        receiver.stop().await;
        assert!(!receiver.is_running());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_blocking_start() {
        let mut receiver = Receiver::bind("127.0.0.1:0").await.unwrap();
        let handle = receiver.stop_handle();

        let run = tokio::spawn(async move {
            receiver.start().await.unwrap();
            receiver
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let receiver = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("start should return after stop")
            .unwrap();
        assert_eq!(receiver.local_addr(), None);
    }

    #[tokio::test]
    async fn test_builder_applies_config() {
        let receiver = Receiver::builder()
            .queue_capacity(3)
            .reply_timeout(Duration::from_millis(5))
            .max_payload_len(1024)
            .build();
        assert_eq!(receiver.config().queue_capacity, 3);
        assert_eq!(
            receiver.config().reply_timeout,
            Some(Duration::from_millis(5))
        );
        assert_eq!(receiver.config().max_payload_len, 1024);
    }
}
