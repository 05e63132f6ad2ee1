/// Wire protocol for the live event channel
use crate::types::Message;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the server's online-user roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Message payload as it travels on the wire. Delivery flags are a client-side
/// concern and never serialized here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
}

impl From<&Message> for MessagePayload {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            sender: msg.sender.clone(),
            receiver: msg.receiver.clone(),
            text: msg.text.clone(),
        }
    }
}

impl From<MessagePayload> for Message {
    fn from(payload: MessagePayload) -> Self {
        // A message that reached us over the live channel was delivered
        Self {
            id: payload.id,
            sender: payload.sender,
            receiver: payload.receiver,
            text: payload.text,
            delivered: true,
            seen: false,
        }
    }
}

/// Logical events exchanged with the messaging server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WireEvent {
    /// Register the local user with the server-side presence registry
    #[serde(rename = "addUser")]
    AddUser {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// Full replacement of the online-user roster
    #[serde(rename = "getUsers")]
    GetUsers { users: Vec<PresenceEntry> },

    /// Outgoing live message
    #[serde(rename = "sendMessage")]
    SendMessage(MessagePayload),

    /// Incoming live message
    #[serde(rename = "getMessage")]
    GetMessage(MessagePayload),

    /// Keystroke activity in a composer
    #[serde(rename = "typing")]
    Typing { sender: String, receiver: String },

    /// Composer went quiet
    #[serde(rename = "stopTyping")]
    StopTyping { sender: String, receiver: String },
}

impl WireEvent {
    /// Serialize event to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize event from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get event name as string
    pub fn name(&self) -> &'static str {
        match self {
            WireEvent::AddUser { .. } => "addUser",
            WireEvent::GetUsers { .. } => "getUsers",
            WireEvent::SendMessage(_) => "sendMessage",
            WireEvent::GetMessage(_) => "getMessage",
            WireEvent::Typing { .. } => "typing",
            WireEvent::StopTyping { .. } => "stopTyping",
        }
    }
}

impl fmt::Display for WireEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireEvent({})", self.name())
    }
}

/// Protocol frame with length prefix
#[derive(Debug)]
pub struct Frame {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame from a wire event
    pub fn from_event(event: &WireEvent) -> Result<Self, serde_json::Error> {
        let payload = event.to_bytes()?;
        Ok(Self {
            length: payload.len() as u32,
            payload,
        })
    }

    /// Serialize frame to bytes (length prefix + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Pop one complete frame off the front of `buf`, if present.
    /// Incomplete data is left untouched for the next read.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if buf.len() < 4 + length {
            return None;
        }

        buf.advance(4);
        let payload = buf.split_to(length).to_vec();

        Some(Self {
            length: length as u32,
            payload,
        })
    }

    /// Parse the framed payload back into a wire event
    pub fn event(&self) -> Result<WireEvent, serde_json::Error> {
        WireEvent::from_bytes(&self.payload)
    }
}
