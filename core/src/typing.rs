/// Typing signal state machine.
///
/// Two halves, both scoped to the single active conversation:
///
/// - `TypingEmitter` turns local composer keystrokes into outgoing `typing` /
///   `stopTyping` events. Every keystroke sends `typing` unconditionally and
///   re-arms one decay timer; the timer firing uninterrupted emits exactly one
///   `stopTyping`. Re-arming aborts the previous timer, it never stacks.
/// - `TypingWatcher` tracks whether the active peer is typing. Start events
///   for any other peer are dropped. A fallback inactivity timeout clears the
///   flag if the peer's `stopTyping` never arrives.
use crate::channel::{ChannelSender, WireEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

#[derive(Clone)]
pub struct TypingEmitter {
    sender: ChannelSender,
    local_user: String,
    debounce: Duration,
    state: Arc<Mutex<EmitterState>>,
}

#[derive(Default)]
struct EmitterState {
    /// Peer the composer is currently addressed to
    receiver: Option<String>,
    /// The armed decay timer, if any
    pending: Option<JoinHandle<()>>,
}

impl TypingEmitter {
    pub fn new(sender: ChannelSender, local_user: impl Into<String>, debounce: Duration) -> Self {
        Self {
            sender,
            local_user: local_user.into(),
            debounce,
            state: Arc::new(Mutex::new(EmitterState::default())),
        }
    }

    /// Called for every keystroke in the composer. Sends `typing` immediately
    /// and re-arms the single decay timer for the current receiver.
    pub async fn keystroke(&self) {
        let mut state = self.state.lock().await;
        let Some(receiver) = state.receiver.clone() else {
            return;
        };

        self.sender.send(WireEvent::Typing {
            sender: self.local_user.clone(),
            receiver: receiver.clone(),
        });

        if let Some(timer) = state.pending.take() {
            timer.abort();
        }

        let sender = self.sender.clone();
        let local_user = self.local_user.clone();
        let debounce = self.debounce;
        state.pending = Some(tokio::spawn(async move {
            sleep(debounce).await;
            debug!("Typing decay fired for {}", receiver);
            sender.send(WireEvent::StopTyping {
                sender: local_user,
                receiver,
            });
        }));
    }

    /// Switch the composer target. A decay timer still pending for the
    /// previous peer is cancelled and its `stopTyping` flushed immediately,
    /// so the old conversation never shows a stuck indicator.
    pub async fn set_receiver(&self, peer: Option<String>) {
        let mut state = self.state.lock().await;
        if state.receiver == peer {
            return;
        }

        if let Some(timer) = state.pending.take() {
            if !timer.is_finished() {
                timer.abort();
                if let Some(prev) = state.receiver.clone() {
                    debug!("Flushing pending stopTyping to {}", prev);
                    self.sender.send(WireEvent::StopTyping {
                        sender: self.local_user.clone(),
                        receiver: prev,
                    });
                }
            }
        }

        state.receiver = peer;
    }
}

#[derive(Clone)]
pub struct TypingWatcher {
    idle_timeout: Duration,
    state: Arc<Mutex<WatchState>>,
}

#[derive(Default)]
struct WatchState {
    active_peer: Option<String>,
    peer_typing: bool,
    /// Clears the flag if the peer's stop event never arrives
    fallback: Option<JoinHandle<()>>,
}

impl TypingWatcher {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            state: Arc::new(Mutex::new(WatchState::default())),
        }
    }

    /// Switch the watched conversation; any previous indicator state is
    /// discarded.
    pub async fn set_active_peer(&self, peer: Option<String>) {
        let mut state = self.state.lock().await;
        if let Some(fallback) = state.fallback.take() {
            fallback.abort();
        }
        state.peer_typing = false;
        state.active_peer = peer;
    }

    pub async fn on_typing_started(&self, sender: &str) {
        let mut state = self.state.lock().await;
        if state.active_peer.as_deref() != Some(sender) {
            debug!("Ignoring typing event from inactive peer {}", sender);
            return;
        }

        state.peer_typing = true;

        if let Some(fallback) = state.fallback.take() {
            fallback.abort();
        }

        let watcher = self.clone();
        let sender = sender.to_string();
        state.fallback = Some(tokio::spawn(async move {
            sleep(watcher.idle_timeout).await;
            let mut state = watcher.state.lock().await;
            if state.active_peer.as_deref() == Some(sender.as_str()) {
                debug!("Typing indicator for {} timed out", sender);
                state.peer_typing = false;
            }
        }));
    }

    pub async fn on_typing_stopped(&self, sender: &str) {
        let mut state = self.state.lock().await;
        if state.active_peer.as_deref() != Some(sender) {
            return;
        }
        state.peer_typing = false;
        if let Some(fallback) = state.fallback.take() {
            fallback.abort();
        }
    }

    pub async fn is_peer_typing(&self) -> bool {
        self.state.lock().await.peer_typing
    }
}
