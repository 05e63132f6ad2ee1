/// The active conversation: one ordered message sequence reconciling three
/// sources of truth — the on-demand history fetch, the live event stream, and
/// local optimistic sends.
///
/// Only one conversation is materialized at a time. Selecting a peer discards
/// the previous sequence and refetches; streamed messages for any other peer
/// are dropped. A selection generation counter turns the fetch-vs-switch race
/// into a deterministic ignore rule: a history response is applied only if no
/// newer selection happened while it was in flight.
use crate::api::Backend;
use crate::channel::{ChannelSender, WireEvent};
use crate::error::Result;
use crate::types::{Message, Peer};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ConversationStore<B: Backend> {
    backend: B,
    sender: ChannelSender,
    local_user: String,
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    active_peer: Option<Peer>,
    messages: Vec<Message>,
    /// Bumped on every selection; stale fetch results are discarded
    generation: u64,
}

impl<B: Backend> ConversationStore<B> {
    pub fn new(backend: B, sender: ChannelSender, local_user: impl Into<String>) -> Self {
        Self {
            backend,
            sender,
            local_user: local_user.into(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Select the conversation peer: clear the sequence and refetch history.
    /// If another selection happens while the fetch is in flight, the fetched
    /// list is discarded instead of overwriting the newer conversation.
    pub async fn select_peer(&self, peer: Peer) -> Result<()> {
        let generation = {
            let mut inner = self.inner.write().await;
            inner.generation += 1;
            inner.active_peer = Some(peer.clone());
            inner.messages.clear();
            inner.generation
        };

        let history = self.backend.fetch_history(&peer.id).await?;

        let mut inner = self.inner.write().await;
        if inner.generation == generation {
            debug!("Loaded {} history messages for {}", history.len(), peer.id);
            inner.messages = history;
        } else {
            debug!("Discarding stale history for {}", peer.id);
        }
        Ok(())
    }

    /// Send a message to the active peer.
    ///
    /// Empty or whitespace-only text is a no-op, as is sending with no peer
    /// selected. Otherwise the live event is emitted, the durable write is
    /// fired without being awaited, and an optimistic entry is appended
    /// immediately — responsiveness over strict consistency.
    pub async fn send(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        let Some(peer) = inner.active_peer.clone() else {
            return Ok(());
        };

        let message = Message::outgoing(&self.local_user, &peer.id, text);
        self.sender.send(WireEvent::SendMessage((&message).into()));

        let backend = self.backend.clone();
        let receiver = peer.id.clone();
        let body = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = backend.store_message(&receiver, &body).await {
                warn!("Durable write of message to {} failed: {}", receiver, e);
            }
        });

        inner.messages.push(message);
        Ok(())
    }

    /// Handle a live message from the channel. Appends only when the
    /// message's counterpart is the active peer; anything else is silently
    /// dropped. Duplicate ids (a server echoing our own send back) are
    /// dropped too.
    pub async fn receive(&self, message: Message) {
        let mut inner = self.inner.write().await;
        let Some(peer) = inner.active_peer.clone() else {
            debug!("No active conversation, dropping live message");
            return;
        };

        if message.counterpart(&self.local_user) != peer.id {
            debug!(
                "Dropping live message for inactive conversation with {}",
                message.counterpart(&self.local_user)
            );
            return;
        }

        if !message.id.is_empty() && inner.messages.iter().any(|m| m.id == message.id) {
            debug!("Dropping duplicate live message {}", message.id);
            return;
        }

        inner.messages.push(message);
    }

    pub async fn active_peer(&self) -> Option<Peer> {
        self.inner.read().await.active_peer.clone()
    }

    /// Current (active peer, transcript) pair for the view projection.
    pub async fn snapshot(&self) -> (Option<Peer>, Vec<Message>) {
        let inner = self.inner.read().await;
        (inner.active_peer.clone(), inner.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelSender;
    use crate::error::ChatError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    /// In-memory backend with per-peer history and an optional per-peer delay
    /// to provoke fetch races.
    #[derive(Clone, Default)]
    struct FakeBackend {
        history: Arc<Mutex<HashMap<String, Vec<Message>>>>,
        delays: Arc<Mutex<HashMap<String, Duration>>>,
        stored: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeBackend {
        fn with_history(mut peers: Vec<(&str, Vec<Message>)>) -> Self {
            let backend = Self::default();
            let mut history = backend.history.lock().unwrap();
            for (peer, messages) in peers.drain(..) {
                history.insert(peer.to_string(), messages);
            }
            drop(history);
            backend
        }

        fn delay(&self, peer: &str, delay: Duration) {
            self.delays.lock().unwrap().insert(peer.to_string(), delay);
        }

        fn stored(&self) -> Vec<(String, String)> {
            self.stored.lock().unwrap().clone()
        }
    }

    impl Backend for FakeBackend {
        async fn fetch_users(&self) -> Result<Vec<Peer>> {
            Ok(Vec::new())
        }

        async fn fetch_history(&self, peer_id: &str) -> Result<Vec<Message>> {
            let delay = self.delays.lock().unwrap().get(peer_id).copied();
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            self.history
                .lock()
                .unwrap()
                .get(peer_id)
                .cloned()
                .ok_or_else(|| ChatError::Api(format!("no history for {}", peer_id)))
        }

        async fn store_message(&self, receiver: &str, text: &str) -> Result<()> {
            self.stored
                .lock()
                .unwrap()
                .push((receiver.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn store(
        backend: FakeBackend,
    ) -> (
        ConversationStore<FakeBackend>,
        mpsc::UnboundedReceiver<WireEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConversationStore::new(backend, ChannelSender::new(tx), "me"),
            rx,
        )
    }

    fn history_msg(sender: &str, receiver: &str, text: &str) -> Message {
        Message {
            id: String::new(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            text: text.to_string(),
            delivered: true,
            seen: true,
        }
    }

    #[tokio::test]
    async fn test_select_peer_loads_history() {
        let backend = FakeBackend::with_history(vec![(
            "p1",
            vec![history_msg("p1", "me", "old hello")],
        )]);
        let (store, _rx) = store(backend);

        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        let (peer, messages) = store.snapshot().await;
        assert_eq!(peer.unwrap().id, "p1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "old hello");
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_sends_are_noops() {
        let backend = FakeBackend::with_history(vec![("p1", vec![])]);
        let (store, mut rx) = store(backend.clone());
        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        store.send("").await.unwrap();
        store.send("   \t\n").await.unwrap();

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(backend.stored().is_empty());
        let (_, messages) = store.snapshot().await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_selection_is_noop() {
        let backend = FakeBackend::default();
        let (store, mut rx) = store(backend.clone());

        store.send("hello").await.unwrap();

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(backend.stored().is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_optimistically_and_writes_durably() {
        let backend = FakeBackend::with_history(vec![("p1", vec![])]);
        let (store, mut rx) = store(backend.clone());
        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        store.send("hi").await.unwrap();

        let (_, messages) = store.snapshot().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "me");
        assert_eq!(messages[0].text, "hi");
        assert!(messages[0].delivered);
        assert!(!messages[0].seen);

        // Live event went out on the channel
        match rx.try_recv().unwrap() {
            WireEvent::SendMessage(payload) => {
                assert_eq!(payload.receiver, "p1");
                assert_eq!(payload.text, "hi");
            }
            other => panic!("unexpected event: {}", other),
        }

        // Durable write is fire-and-forget; give the spawned task a beat
        for _ in 0..10 {
            if !backend.stored().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.stored(), vec![("p1".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_consecutive_sends_keep_order() {
        let backend = FakeBackend::with_history(vec![(
            "p1",
            vec![history_msg("p1", "me", "first")],
        )]);
        let (store, _rx) = store(backend);
        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        for text in ["one", "two", "three"] {
            store.send(text).await.unwrap();
        }

        let (_, messages) = store.snapshot().await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].text, "one");
        assert_eq!(messages[2].text, "two");
        assert_eq!(messages[3].text, "three");
        assert!(messages[1..].iter().all(|m| m.delivered && !m.seen));
    }

    #[tokio::test]
    async fn test_receive_drops_inactive_peer_messages() {
        let backend = FakeBackend::with_history(vec![("p1", vec![])]);
        let (store, _rx) = store(backend);
        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        store.receive(Message::outgoing("p2", "me", "wrong room")).await;
        let (_, messages) = store.snapshot().await;
        assert!(messages.is_empty());

        store.receive(Message::outgoing("p1", "me", "right room")).await;
        let (_, messages) = store.snapshot().await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_receive_dedups_echoed_send() {
        let backend = FakeBackend::with_history(vec![("p1", vec![])]);
        let (store, _rx) = store(backend);
        store.select_peer(Peer::new("p1", "One")).await.unwrap();

        store.send("hi").await.unwrap();
        let (_, messages) = store.snapshot().await;
        let echoed = messages[0].clone();

        // Server echoes our own message back over the live channel
        store.receive(echoed).await;
        let (_, messages) = store.snapshot().await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_never_overwrites_newer_selection() {
        let backend = FakeBackend::with_history(vec![
            ("p1", vec![history_msg("p1", "me", "from p1")]),
            ("p2", vec![history_msg("p2", "me", "from p2")]),
        ]);
        backend.delay("p1", Duration::from_millis(500));
        let (store, _rx) = store(backend);

        // Slow fetch for p1 still in flight when p2 is selected
        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.select_peer(Peer::new("p1", "One")).await })
        };
        tokio::task::yield_now().await;
        store.select_peer(Peer::new("p2", "Two")).await.unwrap();

        slow.await.unwrap().unwrap();

        let (peer, messages) = store.snapshot().await;
        assert_eq!(peer.unwrap().id, "p2");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "from p2");
    }
}
