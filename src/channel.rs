//! The messaging channel: one duplex connection to the room authority.
//!
//! [`MessagingChannel`] owns a background transport loop task. Commands are
//! queued to the loop over an unbounded MPSC channel and acknowledged through
//! per-invocation oneshot channels. Pushed events are dispatched, on the loop,
//! to handlers registered with [`on_broadcast`](MessagingChannel::on_broadcast)
//! and [`on_direct`](MessagingChannel::on_direct); each registration returns a
//! [`Subscription`] that removes the handler when disposed or dropped.
//!
//! [`SharedChannel`] is the long-lived, process-wide handle: it establishes the
//! connection through a [`Connector`] on first use and hands the same channel
//! to every later caller while it stays connected.
//!
//! # Example
//!
//! ```rust,ignore
//! let shared = SharedChannel::new(WebSocketConnector::new(url), ChannelConfig::new());
//! let channel = shared.connect().await?;
//!
//! let _reveals = channel.on_broadcast(BroadcastKind::RevealStateChanged, |event| {
//!     println!("reveal: {event:?}");
//! });
//! channel.invoke(Command::ToggleReveal).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Result, RoomError};
use crate::protocol::{
    BroadcastKind, Command, DirectKind, DirectMessage, Invocation, InvocationId, RoomBroadcast,
    ServerMessage,
};
use crate::transport::Transport;

/// Default time to wait for the authority to acknowledge a command.
const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`MessagingChannel`].
///
/// # Example
///
/// ```
/// use planning_poker_client::channel::ChannelConfig;
/// use std::time::Duration;
///
/// let config = ChannelConfig::new()
///     .with_invoke_timeout(Duration::from_secs(5))
///     .with_shutdown_timeout(Duration::from_millis(500));
/// assert_eq!(config.invoke_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long [`MessagingChannel::invoke`] waits for a completion before
    /// failing with [`RoomError::Timeout`].
    ///
    /// Defaults to **10 seconds**.
    pub invoke_timeout: Duration,
    /// Time the transport loop gets to close the transport on
    /// [`MessagingChannel::shutdown`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the acknowledgement timeout for invoked commands.
    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handler registry ────────────────────────────────────────────────

type BroadcastHandler = Arc<dyn Fn(&RoomBroadcast) + Send + Sync>;
type DirectHandler = Arc<dyn Fn(&DirectMessage) + Send + Sync>;
type ClosedHandler = Arc<dyn Fn(Option<&str>) + Send + Sync>;

type SubscriptionId = u64;

#[derive(Default)]
struct HandlerRegistry {
    next_id: SubscriptionId,
    broadcast: Vec<(SubscriptionId, BroadcastKind, BroadcastHandler)>,
    direct: Vec<(SubscriptionId, DirectKind, DirectHandler)>,
    closed: Vec<(SubscriptionId, ClosedHandler)>,
}

impl HandlerRegistry {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, ids: &[SubscriptionId]) {
        self.broadcast.retain(|(id, _, _)| !ids.contains(id));
        self.direct.retain(|(id, _, _)| !ids.contains(id));
        self.closed.retain(|(id, _)| !ids.contains(id));
    }

    fn len(&self) -> usize {
        self.broadcast.len() + self.direct.len() + self.closed.len()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the channel handle, the transport loop and subscriptions.
struct Shared {
    connected: AtomicBool,
    next_invocation: AtomicU64,
    pending: Mutex<HashMap<InvocationId, oneshot::Sender<Result<()>>>>,
    handlers: Mutex<HandlerRegistry>,
}

impl Shared {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_invocation: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HandlerRegistry::default()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<InvocationId, oneshot::Sender<Result<()>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Subscriptions ───────────────────────────────────────────────────

/// Handle to one registered event handler.
///
/// The handler is removed by [`dispose`](Subscription::dispose) or when the
/// handle is dropped. After removal, frames dispatched by the transport loop no
/// longer reach it.
#[must_use = "dropping a Subscription immediately unregisters its handler"]
pub struct Subscription {
    id: SubscriptionId,
    shared: Weak<Shared>,
    disposed: bool,
}

impl Subscription {
    /// Unregister the handler. Calling this more than once is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(shared) = self.shared.upgrade() {
            shared.handlers().remove(&[self.id]);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// A set of subscriptions torn down together.
///
/// [`dispose`](SubscriptionGroup::dispose) removes every handler of the same
/// channel under a single registry lock, so the transport loop never observes
/// a partially torn-down group.
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Unregister every handler in the group.
    pub fn dispose(&mut self) {
        let mut remaining = std::mem::take(&mut self.subscriptions);
        while let Some(shared) = remaining.first().map(|s| s.shared.clone()) {
            let (batch, rest): (Vec<Subscription>, Vec<Subscription>) = remaining
                .into_iter()
                .partition(|s| Weak::ptr_eq(&s.shared, &shared));
            remaining = rest;

            let ids: Vec<SubscriptionId> = batch.iter().map(|s| s.id).collect();
            if let Some(shared) = shared.upgrade() {
                shared.handlers().remove(&ids);
            }
            for mut subscription in batch {
                subscription.disposed = true;
            }
        }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Channel handle ──────────────────────────────────────────────────

/// Duplex connection to the room authority.
///
/// Created via [`MessagingChannel::start`], which spawns the transport loop.
/// The handle is shared behind an [`Arc`]; every method takes `&self`.
pub struct MessagingChannel {
    /// Sender half of the outbound frame channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<Invocation>,
    shared: Arc<Shared>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    config: ChannelConfig,
}

impl MessagingChannel {
    /// Start the transport loop over a connected transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(transport: impl Transport, config: ChannelConfig) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Invocation>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(Shared::new());
        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            Arc::clone(&shared),
            shutdown_rx,
        ));

        Arc::new(Self {
            cmd_tx,
            shared,
            task: Mutex::new(Some(task)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            config,
        })
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send a command and wait for the authority's acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`RoomError::CommandRejected`] if the authority refused the command
    /// - [`RoomError::Timeout`] if no completion arrived within `invoke_timeout`
    /// - [`RoomError::NotConnected`] if the channel is or becomes closed
    pub async fn invoke(&self, command: Command) -> Result<()> {
        let name = command.name();
        let invocation_id = self.next_invocation_id();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.pending().insert(invocation_id, ack_tx);

        // Checked after registering so the loop's close-time drain sees the entry.
        if let Err(e) = self.send(Invocation {
            invocation_id,
            command,
        }) {
            self.shared.pending().remove(&invocation_id);
            return Err(e);
        }
        debug!(command = name, invocation_id, "invoked command");

        match tokio::time::timeout(self.config.invoke_timeout, ack_rx).await {
            Ok(Ok(result)) => {
                if let Err(e) = &result {
                    warn!(command = name, invocation_id, "command failed: {e}");
                }
                result
            }
            Ok(Err(_)) => Err(RoomError::NotConnected),
            Err(_) => {
                self.shared.pending().remove(&invocation_id);
                warn!(command = name, invocation_id, "command acknowledgement timed out");
                Err(RoomError::Timeout)
            }
        }
    }

    /// Queue a command without waiting for its acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the channel has closed.
    pub fn notify(&self, command: Command) -> Result<()> {
        let invocation_id = self.next_invocation_id();
        debug!(command = command.name(), invocation_id, "notified command");
        self.send(Invocation {
            invocation_id,
            command,
        })
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register a handler for one kind of room-wide event.
    pub fn on_broadcast<F>(&self, kind: BroadcastKind, handler: F) -> Subscription
    where
        F: Fn(&RoomBroadcast) + Send + Sync + 'static,
    {
        let mut handlers = self.shared.handlers();
        let id = handlers.allocate();
        handlers.broadcast.push((id, kind, Arc::new(handler)));
        self.subscription(id)
    }

    /// Register a handler for one kind of event addressed to this connection.
    pub fn on_direct<F>(&self, kind: DirectKind, handler: F) -> Subscription
    where
        F: Fn(&DirectMessage) + Send + Sync + 'static,
    {
        let mut handlers = self.shared.handlers();
        let id = handlers.allocate();
        handlers.direct.push((id, kind, Arc::new(handler)));
        self.subscription(id)
    }

    /// Register a handler run once when the connection closes. The argument is
    /// the close reason, `None` for a clean close by the authority.
    pub fn on_closed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        let mut handlers = self.shared.handlers();
        let id = handlers.allocate();
        handlers.closed.push((id, Arc::new(handler)));
        self.subscription(id)
    }

    /// Number of live handler registrations.
    pub fn handler_count(&self) -> usize {
        self.shared.handlers().len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Close the transport and stop the background task.
    ///
    /// Pending invocations fail with [`RoomError::NotConnected`] and closed
    /// handlers run with the reason `"channel shut down"`.
    pub async fn shutdown(&self) {
        debug!("MessagingChannel: shutdown requested");

        let shutdown_tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                    mark_closed(&self.shared, Some("channel shut down"));
                }
            }
        }

        self.shared.connected.store(false, Ordering::Release);
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn next_invocation_id(&self) -> InvocationId {
        self.shared.next_invocation.fetch_add(1, Ordering::Relaxed)
    }

    fn subscription(&self, id: SubscriptionId) -> Subscription {
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
            disposed: false,
        }
    }

    /// Queue an invocation to the transport loop.
    fn send(&self, invocation: Invocation) -> Result<()> {
        if !self.is_connected() {
            return Err(RoomError::NotConnected);
        }
        self.cmd_tx
            .send(invocation)
            .map_err(|_| RoomError::NotConnected)
    }
}

impl std::fmt::Debug for MessagingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingChannel")
            .field("connected", &self.is_connected())
            .field("handlers", &self.handler_count())
            .field("pending", &self.shared.pending().len())
            .finish()
    }
}

impl Drop for MessagingChannel {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close here; aborting
        // drops the transport loop future and the transport with it.
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop multiplexing outbound invocations, the shutdown signal and
/// inbound frames via `tokio::select!`.
///
/// Exits when the command channel closes, the shutdown signal fires, the
/// transport returns `None`, or a transport error occurs.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Invocation>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    let reason: Option<String> = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(invocation) => {
                        match serde_json::to_string(&invocation) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    break Some(format!("transport send error: {e}"));
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize invocation: {e}");
                                resolve(&shared, invocation.invocation_id, Err(RoomError::Serialization(e)));
                            }
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        break Some("channel shut down".into());
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                break Some("channel shut down".into());
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => dispatch(&shared, message),
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} (raw: {text})");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break Some(format!("transport receive error: {e}"));
                    }
                    None => {
                        debug!("transport closed by authority");
                        break None;
                    }
                }
            }
        }
    };

    mark_closed(&shared, reason.as_deref());
    debug!("transport loop exited");
}

/// Route one inbound frame: completions to their waiter, events to handlers.
fn dispatch(shared: &Shared, message: ServerMessage) {
    match message {
        ServerMessage::Completion {
            invocation_id,
            error,
            error_code,
        } => {
            let result = match error {
                None => Ok(()),
                Some(message) => Err(RoomError::CommandRejected {
                    message,
                    error_code,
                }),
            };
            resolve(shared, invocation_id, result);
        }
        ServerMessage::Broadcast(event) => {
            let kind = event.kind();
            // Handlers are cloned out so they can register or dispose while running.
            let handlers: Vec<BroadcastHandler> = shared
                .handlers()
                .broadcast
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, h)| Arc::clone(h))
                .collect();
            debug!(?kind, handlers = handlers.len(), "dispatching broadcast");
            for handler in handlers {
                handler(&event);
            }
        }
        ServerMessage::Direct(message) => {
            let kind = message.kind();
            let handlers: Vec<DirectHandler> = shared
                .handlers()
                .direct
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, h)| Arc::clone(h))
                .collect();
            debug!(?kind, handlers = handlers.len(), "dispatching direct message");
            for handler in handlers {
                handler(&message);
            }
        }
        ServerMessage::Error {
            message,
            error_code,
        } => {
            warn!(?error_code, "authority error: {message}");
        }
    }
}

fn resolve(shared: &Shared, invocation_id: InvocationId, result: Result<()>) {
    match shared.pending().remove(&invocation_id) {
        Some(ack_tx) => {
            // The waiter may have timed out and gone away.
            let _ = ack_tx.send(result);
        }
        None => debug!(invocation_id, "completion for unknown or detached invocation"),
    }
}

/// Flip to disconnected, fail every pending invocation and run closed handlers.
fn mark_closed(shared: &Shared, reason: Option<&str>) {
    if !shared.connected.swap(false, Ordering::AcqRel) {
        return;
    }
    let pending: Vec<_> = shared.pending().drain().collect();
    for (_, ack_tx) in pending {
        let _ = ack_tx.send(Err(RoomError::NotConnected));
    }

    let handlers: Vec<ClosedHandler> = shared
        .handlers()
        .closed
        .iter()
        .map(|(_, h)| Arc::clone(h))
        .collect();
    for handler in handlers {
        handler(reason);
    }
}

// ── Shared (process-wide) channel ───────────────────────────────────

/// Factory for connected transports, invoked lazily by [`SharedChannel`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Output: Transport;

    /// Establish a new connection to the room authority.
    async fn connect(&self) -> Result<Self::Output>;
}

#[async_trait]
impl<F, Fut, T> Connector for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Transport,
{
    type Output = T;

    async fn connect(&self) -> Result<T> {
        (self)().await
    }
}

/// Long-lived handle to the process-wide messaging channel.
///
/// Construct one and pass it (or an `Arc` of it) to every
/// [`RoomSyncClient`](crate::room::RoomSyncClient); it is never a hidden global.
pub struct SharedChannel<C: Connector> {
    connector: C,
    config: ChannelConfig,
    current: tokio::sync::Mutex<Option<Arc<MessagingChannel>>>,
}

impl<C: Connector> SharedChannel<C> {
    pub fn new(connector: C, config: ChannelConfig) -> Self {
        Self {
            connector,
            config,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Return the live channel, connecting first if there is none.
    ///
    /// Calling this while connected is a no-op that returns the same channel.
    /// Concurrent callers wait for a single connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Connection`] if the connector fails.
    pub async fn connect(&self) -> Result<Arc<MessagingChannel>> {
        let mut current = self.current.lock().await;
        if let Some(channel) = current.as_ref() {
            if channel.is_connected() {
                debug!("messaging channel already connected");
                return Ok(Arc::clone(channel));
            }
            debug!("previous messaging channel closed; reconnecting");
        }

        let transport = self.connector.connect().await.map_err(|e| {
            error!("messaging channel connection failed: {e}");
            match e {
                RoomError::Connection(_) => e,
                other => RoomError::Connection(other.to_string()),
            }
        })?;

        let channel = MessagingChannel::start(transport, self.config.clone());
        *current = Some(Arc::clone(&channel));
        info!("messaging channel established");
        Ok(channel)
    }

    /// The current channel, if one was established and is still connected.
    pub async fn current(&self) -> Option<Arc<MessagingChannel>> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|channel| channel.is_connected())
            .cloned()
    }

    /// Shut the current channel down, if any.
    pub async fn disconnect(&self) {
        let channel = self.current.lock().await.take();
        if let Some(channel) = channel {
            channel.shutdown().await;
        }
    }
}

impl<C: Connector> std::fmt::Debug for SharedChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChannel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error_codes::ErrorCode;
    use crate::transports::loopback::{loopback_pair, LoopbackServer, LoopbackTransport};
    use std::sync::atomic::AtomicUsize;

    fn start() -> (Arc<MessagingChannel>, LoopbackServer) {
        let (transport, server) = loopback_pair();
        let config = ChannelConfig::new().with_invoke_timeout(Duration::from_millis(200));
        (MessagingChannel::start(transport, config), server)
    }

    fn completion(invocation_id: InvocationId, error: Option<&str>) -> String {
        serde_json::to_string(&ServerMessage::Completion {
            invocation_id,
            error: error.map(Into::into),
            error_code: error.map(|_| ErrorCode::NotRoomAdmin),
        })
        .unwrap()
    }

    async fn next_invocation(server: &mut LoopbackServer) -> Invocation {
        let raw = server.rx.recv().await.expect("client frame");
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn invoke_resolves_on_completion() {
        let (channel, mut server) = start();

        let call = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.invoke(Command::ToggleReveal).await })
        };

        let invocation = next_invocation(&mut server).await;
        assert_eq!(invocation.command, Command::ToggleReveal);
        server
            .tx
            .send(completion(invocation.invocation_id, None))
            .unwrap();

        assert!(call.await.unwrap().is_ok());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn invoke_surfaces_rejection() {
        let (channel, mut server) = start();

        let call = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.invoke(Command::DestroyRoom).await })
        };

        let invocation = next_invocation(&mut server).await;
        server
            .tx
            .send(completion(invocation.invocation_id, Some("not admin")))
            .unwrap();

        match call.await.unwrap() {
            Err(RoomError::CommandRejected {
                message,
                error_code,
            }) => {
                assert_eq!(message, "not admin");
                assert_eq!(error_code, Some(ErrorCode::NotRoomAdmin));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn invoke_times_out_without_completion() {
        let (channel, _server) = start();
        let result = channel.invoke(Command::ToggleReveal).await;
        assert!(matches!(result, Err(RoomError::Timeout)));
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn invocation_ids_are_unique() {
        let (channel, mut server) = start();
        channel.notify(Command::LeaveRoom).unwrap();
        channel.notify(Command::LeaveRoom).unwrap();

        let first = next_invocation(&mut server).await;
        let second = next_invocation(&mut server).await;
        assert_ne!(first.invocation_id, second.invocation_id);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_fails_pending_invocations() {
        let (channel, mut server) = start();

        let call = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.invoke(Command::ClearWorkItem).await })
        };
        let _ = next_invocation(&mut server).await;
        drop(server);

        assert!(matches!(call.await.unwrap(), Err(RoomError::NotConnected)));
        assert!(!channel.is_connected());
        assert!(matches!(
            channel.notify(Command::LeaveRoom),
            Err(RoomError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn broadcast_reaches_matching_handlers_only() {
        let (channel, server) = start();
        let reveals = Arc::new(AtomicUsize::new(0));
        let packs = Arc::new(AtomicUsize::new(0));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let _reveal_sub = {
            let reveals = Arc::clone(&reveals);
            channel.on_broadcast(BroadcastKind::RevealStateChanged, move |_| {
                reveals.fetch_add(1, Ordering::SeqCst);
                let _ = seen_tx.send(());
            })
        };
        let _pack_sub = {
            let packs = Arc::clone(&packs);
            channel.on_broadcast(BroadcastKind::ActivePackChanged, move |_| {
                packs.fetch_add(1, Ordering::SeqCst);
            })
        };

        server
            .send(&ServerMessage::Broadcast(RoomBroadcast::RevealStateChanged(true)))
            .unwrap();
        seen_rx.recv().await.unwrap();

        assert_eq!(reveals.load(Ordering::SeqCst), 1);
        assert_eq!(packs.load(Ordering::SeqCst), 0);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn disposed_subscription_stops_receiving() {
        let (channel, server) = start();
        let calls = Arc::new(AtomicUsize::new(0));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let mut counted = {
            let calls = Arc::clone(&calls);
            channel.on_direct(DirectKind::AdminStatus, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _marker = channel.on_direct(DirectKind::AdminStatus, move |_| {
            let _ = seen_tx.send(());
        });
        assert_eq!(channel.handler_count(), 2);

        counted.dispose();
        assert!(counted.is_disposed());
        assert_eq!(channel.handler_count(), 1);

        server
            .send(&ServerMessage::Direct(DirectMessage::AdminStatus(true)))
            .unwrap();
        seen_rx.recv().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn group_dispose_removes_all_handlers() {
        let (channel, _server) = start();
        let mut group = SubscriptionGroup::new();
        for kind in BroadcastKind::ALL {
            group.push(channel.on_broadcast(kind, |_| {}));
        }
        group.push(channel.on_closed(|_| {}));
        assert_eq!(group.len(), 6);
        assert_eq!(channel.handler_count(), 6);

        group.dispose();
        assert!(group.is_empty());
        assert_eq!(channel.handler_count(), 0);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn closed_handler_receives_reason() {
        let (channel, server) = start();
        let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
        let _closed = channel.on_closed(move |reason| {
            let _ = reason_tx.send(reason.map(str::to_string));
        });

        drop(server);
        assert_eq!(reason_rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (channel, server) = start();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let _sub = channel.on_broadcast(BroadcastKind::RoomDestroyed, move |_| {
            let _ = seen_tx.send(());
        });

        server.tx.send("{not json".into()).unwrap();
        server
            .send(&ServerMessage::Broadcast(RoomBroadcast::RoomDestroyed))
            .unwrap();
        seen_rx.recv().await.unwrap();
        assert!(channel.is_connected());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn shared_channel_connects_once() {
        let connects = Arc::new(AtomicUsize::new(0));
        let servers = Arc::new(Mutex::new(Vec::new()));
        let connector = {
            let connects = Arc::clone(&connects);
            let servers = Arc::clone(&servers);
            move || {
                connects.fetch_add(1, Ordering::SeqCst);
                let (transport, server) = loopback_pair();
                servers.lock().unwrap().push(server);
                async move { Ok::<LoopbackTransport, RoomError>(transport) }
            }
        };
        let shared = SharedChannel::new(connector, ChannelConfig::new());

        let first = shared.connect().await.unwrap();
        let second = shared.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        shared.disconnect().await;
        assert!(shared.current().await.is_none());
        let third = shared.connect().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        shared.disconnect().await;
    }

    #[tokio::test]
    async fn shared_channel_reports_connection_failure() {
        let connector = || async { Err::<LoopbackTransport, _>(RoomError::TransportClosed) };
        let shared = SharedChannel::new(connector, ChannelConfig::new());
        let err = shared.connect().await.unwrap_err();
        assert!(matches!(err, RoomError::Connection(_)));
    }
}
