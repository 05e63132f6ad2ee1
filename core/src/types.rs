/// Shared types for the messaging core
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Another user addressable in a conversation. Immutable once loaded from the
/// roster; the local user is never part of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub name: String,
}

impl Peer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One chat message as held in the active conversation.
///
/// Ordering within a conversation is arrival order at the client: fetched
/// history first, then streamed and optimistic entries appended. Messages are
/// never reordered by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Client-generated id, used to drop duplicate echoes of our own sends.
    /// History rows from older servers may not carry one.
    #[serde(default)]
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub seen: bool,
}

impl Message {
    /// Build the optimistic local entry appended immediately on send, before
    /// the durable write is acknowledged.
    pub fn outgoing(sender: &str, receiver: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            text: text.to_string(),
            delivered: true,
            seen: false,
        }
    }

    /// The other party of this message from `local`'s point of view.
    pub fn counterpart(&self, local: &str) -> &str {
        if self.sender == local {
            &self.receiver
        } else {
            &self.sender
        }
    }
}
