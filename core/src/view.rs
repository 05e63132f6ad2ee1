/// Pure derivation of renderable state from the stores. No side effects, no
/// state of its own; recomputed on every dependency change.
use crate::types::{Message, Peer};
use std::collections::HashSet;

/// One row of the peer list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub active: bool,
}

/// Everything a renderer needs for the chat screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatView {
    pub peers: Vec<PeerEntry>,
    pub transcript: Vec<Message>,
    pub typing_banner: Option<String>,
}

/// Project the stores into a render model. Transcript order is store order;
/// the typing banner shows iff the active peer is typing.
pub fn project(
    roster: &[Peer],
    online: &HashSet<String>,
    active_peer: Option<&Peer>,
    transcript: &[Message],
    peer_typing: bool,
) -> ChatView {
    let peers = roster
        .iter()
        .map(|p| PeerEntry {
            id: p.id.clone(),
            name: p.name.clone(),
            online: online.contains(&p.id),
            active: active_peer.map(|a| a.id == p.id).unwrap_or(false),
        })
        .collect();

    let typing_banner = match (active_peer, peer_typing) {
        (Some(peer), true) => Some(format!("{} is typing...", peer.name)),
        _ => None,
    };

    ChatView {
        peers,
        transcript: transcript.to_vec(),
        typing_banner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Peer> {
        vec![Peer::new("p1", "Ada"), Peer::new("p2", "Bob")]
    }

    #[test]
    fn test_online_badges_follow_presence() {
        let online: HashSet<String> = ["p2".to_string()].into_iter().collect();
        let view = project(&roster(), &online, None, &[], false);

        assert_eq!(view.peers.len(), 2);
        assert!(!view.peers[0].online);
        assert!(view.peers[1].online);
        assert!(view.peers.iter().all(|p| !p.active));
    }

    #[test]
    fn test_active_peer_marked() {
        let active = Peer::new("p1", "Ada");
        let view = project(&roster(), &HashSet::new(), Some(&active), &[], false);
        assert!(view.peers[0].active);
        assert!(!view.peers[1].active);
    }

    #[test]
    fn test_typing_banner_requires_active_peer() {
        let active = Peer::new("p1", "Ada");
        let view = project(&roster(), &HashSet::new(), Some(&active), &[], true);
        assert_eq!(view.typing_banner.as_deref(), Some("Ada is typing..."));

        let view = project(&roster(), &HashSet::new(), Some(&active), &[], false);
        assert!(view.typing_banner.is_none());

        // No active conversation, no banner regardless of the flag
        let view = project(&roster(), &HashSet::new(), None, &[], true);
        assert!(view.typing_banner.is_none());
    }

    #[test]
    fn test_transcript_keeps_store_order() {
        let transcript = vec![
            Message::outgoing("me", "p1", "first"),
            Message::outgoing("p1", "me", "second"),
        ];
        let view = project(&roster(), &HashSet::new(), None, &transcript, false);
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[0].text, "first");
        assert_eq!(view.transcript[1].text, "second");
    }
}
