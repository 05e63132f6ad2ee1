/// Chatlink - realtime messaging core
///
/// Client-side core for a live chat: one shared bidirectional event channel
/// to the messaging server, presence tracking, debounced typing signals, and
/// a conversation store that reconciles fetched history with the live event
/// stream and optimistic local sends.

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod presence;
pub mod roster;
pub mod typing;
pub mod types;
pub mod view;

pub use api::{ApiClient, Backend};
pub use channel::{Channel, ChannelEvent, EventKind};
pub use client::ChatClient;
pub use config::Config;
pub use error::{ChatError, Result};
pub use types::{Message, Peer};
pub use view::ChatView;
