/// Error types for the messaging core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Peer error: {0}")]
    Peer(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
