/// The shared live-event channel to the messaging server.
///
/// One `Channel` owns the single underlying TCP connection for the whole
/// application lifetime. Components never hold the connection itself; they
/// hold `Subscription` tokens for the event kinds they care about and a
/// `ChannelSender` for outgoing events. Dropping a subscription detaches that
/// listener only, never the connection.
use crate::channel::protocol::{Frame, WireEvent};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::types::Message;
use bytes::BytesMut;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const JITTER_MS: u64 = 250;

/// Kinds of incoming events a component can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RosterChanged,
    MessageReceived,
    TypingStarted,
    TypingStopped,
}

/// A typed incoming event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Full replacement of the set of online peer ids
    RosterChanged(HashSet<String>),
    /// A live message arrived
    MessageReceived(Message),
    /// A peer started typing
    TypingStarted(String),
    /// A peer stopped typing
    TypingStopped(String),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::RosterChanged(_) => EventKind::RosterChanged,
            ChannelEvent::MessageReceived(_) => EventKind::MessageReceived,
            ChannelEvent::TypingStarted(_) => EventKind::TypingStarted,
            ChannelEvent::TypingStopped(_) => EventKind::TypingStopped,
        }
    }

    /// Map a wire event to its subscriber-facing form. Returns `None` for
    /// kinds that only ever travel client-to-server.
    fn from_wire(event: WireEvent) -> Option<Self> {
        match event {
            WireEvent::GetUsers { users } => Some(ChannelEvent::RosterChanged(
                users.into_iter().map(|u| u.user_id).collect(),
            )),
            WireEvent::GetMessage(payload) => Some(ChannelEvent::MessageReceived(payload.into())),
            WireEvent::Typing { sender, .. } => Some(ChannelEvent::TypingStarted(sender)),
            WireEvent::StopTyping { sender, .. } => Some(ChannelEvent::TypingStopped(sender)),
            WireEvent::AddUser { .. } | WireEvent::SendMessage(_) => None,
        }
    }
}

struct Listener {
    kind: EventKind,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

type Registry = Mutex<HashMap<u64, Listener>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<u64, Listener>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outgoing-event handle, cheap to clone and hand to components.
/// Sends are best-effort: the caller is never blocked on the socket.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<WireEvent>,
}

impl ChannelSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WireEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: WireEvent) {
        if self.tx.send(event).is_err() {
            warn!("Channel is shut down, dropping outgoing event");
        }
    }
}

/// A listener token for one event kind. Dropping it detaches the listener
/// deterministically; the shared connection is unaffected.
pub struct Subscription {
    id: u64,
    kind: EventKind,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Receive the next event of this subscription's kind, in arrival order.
    /// Returns `None` after the channel has shut down.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Explicit detach; equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).remove(&self.id);
        }
    }
}

/// Handle to the process-wide channel connection.
///
/// Created once at application start; dropping it tears the connection down.
pub struct Channel {
    identity: String,
    registry: Arc<Registry>,
    next_listener: AtomicU64,
    outbox: mpsc::UnboundedSender<WireEvent>,
    supervisor: JoinHandle<()>,
}

impl Channel {
    /// Open the channel and register `identity` with the server.
    ///
    /// Never fails: the supervisor task retries the transport with capped
    /// exponential backoff and re-announces the identity after every
    /// reconnect (announcement is idempotent). Subscribers should treat the
    /// channel as best-effort live and rely on history fetches for durable
    /// state.
    pub fn open(addr: impl Into<String>, identity: impl Into<String>, config: &Config) -> Self {
        let addr = addr.into();
        let identity = identity.into();
        let registry: Arc<Registry> = Arc::new(Mutex::new(HashMap::new()));
        let (outbox, outbox_rx) = mpsc::unbounded_channel();

        let supervisor = tokio::spawn(supervise(
            addr,
            identity.clone(),
            registry.clone(),
            outbox_rx,
            config.reconnect_base_delay,
            config.reconnect_max_delay,
        ));

        Self {
            identity,
            registry,
            next_listener: AtomicU64::new(0),
            outbox,
            supervisor,
        }
    }

    /// Re-register the local user with the server. Safe to call at any time;
    /// the supervisor already announces on every (re)connect.
    pub fn announce(&self) {
        self.send(WireEvent::AddUser {
            user_id: self.identity.clone(),
        });
    }

    /// Subscribe to one kind of incoming event.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock_registry(&self.registry).insert(id, Listener { kind, tx });
        debug!("Registered listener {} for {:?}", id, kind);

        Subscription {
            id,
            kind,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Enqueue an outgoing event.
    pub fn send(&self, event: WireEvent) {
        if self.outbox.send(event).is_err() {
            warn!("Channel supervisor gone, dropping outgoing event");
        }
    }

    /// Cheap clonable handle for components that emit events.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender::new(self.outbox.clone())
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

/// Connection supervisor: connect, announce, serve, reconnect on failure.
async fn supervise(
    addr: String,
    identity: String,
    registry: Arc<Registry>,
    mut outbox_rx: mpsc::UnboundedReceiver<WireEvent>,
    base_delay: Duration,
    max_delay: Duration,
) {
    let mut attempt: u32 = 0;

    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!("Channel connected to {}", addr);
                attempt = 0;

                match serve(stream, &identity, &registry, &mut outbox_rx).await {
                    Ok(()) => {
                        // All sender handles dropped; nothing left to serve
                        info!("Channel outbox closed, stopping supervisor");
                        return;
                    }
                    Err(e) => {
                        warn!("Channel connection lost: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!("Channel connect to {} failed: {}", addr, e);
            }
        }

        attempt += 1;
        let delay = backoff_delay(attempt, base_delay, max_delay);
        debug!("Reconnecting to {} in {:?} (attempt {})", addr, delay, attempt);
        sleep(delay).await;
    }
}

/// One connection's lifetime: announce the identity, then pump frames both
/// ways until the transport fails.
async fn serve(
    mut stream: TcpStream,
    identity: &str,
    registry: &Registry,
    outbox_rx: &mut mpsc::UnboundedReceiver<WireEvent>,
) -> Result<()> {
    let announce = WireEvent::AddUser {
        user_id: identity.to_string(),
    };
    let frame = Frame::from_event(&announce)?;
    stream.write_all(&frame.to_bytes()).await?;
    debug!("Announced identity {}", identity);

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            outgoing = outbox_rx.recv() => {
                let Some(event) = outgoing else {
                    return Ok(());
                };
                match Frame::from_event(&event) {
                    Ok(frame) => {
                        stream.write_all(&frame.to_bytes()).await?;
                        debug!("Sent {} event", event.name());
                    }
                    Err(e) => {
                        warn!("Failed to serialize outgoing {}: {}", event.name(), e);
                    }
                }
            }
            read = stream.read_buf(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Err(ChatError::Channel(
                        "connection closed by server".to_string(),
                    ));
                }
                while let Some(frame) = Frame::decode(&mut buf) {
                    match frame.event() {
                        Ok(event) => dispatch(registry, event),
                        Err(e) => warn!("Dropping undecodable frame: {}", e),
                    }
                }
            }
        }
    }
}

/// Fan an incoming event out to all listeners of its kind, in arrival order.
/// Listeners whose receiver went away are pruned here.
fn dispatch(registry: &Registry, event: WireEvent) {
    let name = event.name();
    let Some(event) = ChannelEvent::from_wire(event) else {
        debug!("Ignoring client-to-server event {} from server", name);
        return;
    };
    let kind = event.kind();

    let mut dead = Vec::new();
    {
        let listeners = lock_registry(registry);
        for (id, listener) in listeners.iter() {
            if listener.kind != kind {
                continue;
            }
            if listener.tx.send(event.clone()).is_err() {
                dead.push(*id);
            }
        }
    }

    if !dead.is_empty() {
        let mut listeners = lock_registry(registry);
        for id in dead {
            debug!("Pruning dead listener {}", id);
            listeners.remove(&id);
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    // Doubling, capped; shift bounded so the multiplier cannot overflow
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << exponent).min(cap);
    let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
    delay + Duration::from_millis(jitter)
}
