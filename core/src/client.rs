/// Client orchestration: wires the channel, stores, and typing machinery
/// together and exposes the user-facing actions.
use crate::api::Backend;
use crate::channel::{Channel, ChannelEvent, EventKind, Subscription};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::error::{ChatError, Result};
use crate::presence::PresenceRegistry;
use crate::roster;
use crate::typing::{TypingEmitter, TypingWatcher};
use crate::types::Peer;
use crate::view::{self, ChatView};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The realtime messaging client.
///
/// Owns the process-wide channel connection and one routing task that feeds
/// channel events into the presence registry, conversation store, and typing
/// watcher. User actions (`select_peer`, `keystroke`, `send_message`) mutate
/// the same stores; `view()` projects them into a render model.
pub struct ChatClient<B: Backend> {
    local_user: String,
    channel: Channel,
    presence: PresenceRegistry,
    conversation: ConversationStore<B>,
    typing_out: TypingEmitter,
    typing_in: TypingWatcher,
    roster: Vec<Peer>,
    router: JoinHandle<()>,
}

impl<B: Backend> ChatClient<B> {
    /// Connect the channel, load the roster, and start event routing.
    pub async fn start(config: &Config, backend: B, local_user: impl Into<String>) -> Result<Self> {
        let local_user = local_user.into();

        let channel = Channel::open(&config.server_addr, &local_user, config);
        let roster = roster::load_roster(&backend, &local_user).await?;
        info!("Started chat client for {} ({} peers)", local_user, roster.len());

        let presence = PresenceRegistry::new();
        let conversation = ConversationStore::new(backend, channel.sender(), local_user.clone());
        let typing_out =
            TypingEmitter::new(channel.sender(), local_user.clone(), config.typing_debounce);
        let typing_in = TypingWatcher::new(config.typing_idle_timeout);

        let router = tokio::spawn(route_events(
            channel.subscribe(EventKind::RosterChanged),
            channel.subscribe(EventKind::MessageReceived),
            channel.subscribe(EventKind::TypingStarted),
            channel.subscribe(EventKind::TypingStopped),
            presence.clone(),
            conversation.clone(),
            typing_in.clone(),
        ));

        Ok(Self {
            local_user,
            channel,
            presence,
            conversation,
            typing_out,
            typing_in,
            roster,
            router,
        })
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    pub fn roster(&self) -> &[Peer] {
        &self.roster
    }

    /// Open the conversation with a peer from the roster: flush any pending
    /// typing signal to the previous peer, reset the incoming indicator, and
    /// refetch history.
    pub async fn select_peer(&self, peer_id: &str) -> Result<()> {
        let peer = self
            .roster
            .iter()
            .find(|p| p.id == peer_id)
            .cloned()
            .ok_or_else(|| ChatError::Peer(format!("unknown peer: {}", peer_id)))?;

        self.typing_out.set_receiver(Some(peer.id.clone())).await;
        self.typing_in.set_active_peer(Some(peer.id.clone())).await;
        self.conversation.select_peer(peer).await
    }

    /// Forward one composer keystroke into the typing emitter.
    pub async fn keystroke(&self) {
        self.typing_out.keystroke().await;
    }

    /// Send the composed text to the active peer.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.conversation.send(text).await
    }

    /// Re-announce the local identity on the channel.
    pub fn announce(&self) {
        self.channel.announce();
    }

    /// Project current store state into a render model.
    pub async fn view(&self) -> ChatView {
        let online = self.presence.snapshot().await;
        let (active_peer, transcript) = self.conversation.snapshot().await;
        let peer_typing = self.typing_in.is_peer_typing().await;
        view::project(
            &self.roster,
            &online,
            active_peer.as_ref(),
            &transcript,
            peer_typing,
        )
    }

    /// Tear down the routing task and the channel connection.
    pub fn shutdown(self) {
        self.router.abort();
        drop(self.channel);
        info!("Chat client shut down");
    }
}

/// Forward channel events into the stores, in arrival order. Ends when the
/// channel shuts down and all subscriptions close.
async fn route_events<B: Backend>(
    mut roster_sub: Subscription,
    mut message_sub: Subscription,
    mut started_sub: Subscription,
    mut stopped_sub: Subscription,
    presence: PresenceRegistry,
    conversation: ConversationStore<B>,
    typing_in: TypingWatcher,
) {
    loop {
        tokio::select! {
            Some(event) = roster_sub.recv() => {
                if let ChannelEvent::RosterChanged(online) = event {
                    presence.replace(online).await;
                }
            }
            Some(event) = message_sub.recv() => {
                if let ChannelEvent::MessageReceived(message) = event {
                    conversation.receive(message).await;
                }
            }
            Some(event) = started_sub.recv() => {
                if let ChannelEvent::TypingStarted(peer) = event {
                    typing_in.on_typing_started(&peer).await;
                }
            }
            Some(event) = stopped_sub.recv() => {
                if let ChannelEvent::TypingStopped(peer) = event {
                    typing_in.on_typing_stopped(&peer).await;
                }
            }
            else => break,
        }
    }
    debug!("Event router stopped");
}
