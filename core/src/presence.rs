/// Presence registry derived from roster-changed events.
///
/// The server's roster event is the single source of truth: every event
/// replaces the whole online set. There is no client-side TTL and no
/// incremental patching; a peer is online iff it appeared in the most recent
/// event.
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    online: Arc<RwLock<HashSet<String>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole online set with the latest roster event payload.
    pub async fn replace(&self, online: HashSet<String>) {
        debug!("Roster changed, {} peers online", online.len());
        *self.online.write().await = online;
    }

    pub async fn is_online(&self, peer_id: &str) -> bool {
        self.online.read().await.contains(peer_id)
    }

    pub async fn snapshot(&self) -> HashSet<String> {
        self.online.read().await.clone()
    }
}
