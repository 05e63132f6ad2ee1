/// Live event channel modules
pub mod connection;
pub mod protocol;

pub use connection::{Channel, ChannelEvent, ChannelSender, EventKind, Subscription};
pub use protocol::{Frame, MessagePayload, PresenceEntry, WireEvent};
