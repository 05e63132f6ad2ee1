/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TYPING_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_TYPING_IDLE_TIMEOUT_MS: u64 = 3000;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Messaging server address for the live event channel (host:port)
    pub server_addr: String,

    /// Base URL of the REST API (roster, history, durable writes)
    pub api_base: String,

    /// Local user id announced on the channel
    pub local_user: Option<String>,

    /// Quiet period after the last keystroke before `stopTyping` is emitted
    pub typing_debounce: Duration,

    /// How long an incoming typing indicator may stay lit without a stop event
    pub typing_idle_timeout: Duration,

    /// First reconnect delay after a transport drop
    pub reconnect_base_delay: Duration,

    /// Reconnect delay cap
    pub reconnect_max_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            api_base: "http://127.0.0.1:3000/api".to_string(),
            local_user: None,
            typing_debounce: Duration::from_millis(DEFAULT_TYPING_DEBOUNCE_MS),
            typing_idle_timeout: Duration::from_millis(DEFAULT_TYPING_IDLE_TIMEOUT_MS),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 3 {
            return Err(ChatError::Config(format!(
                "Usage: {} <server_addr> <api_base> [--user <id>] [--debounce-ms <ms>] [--idle-timeout-ms <ms>]",
                args.first().map(|s| s.as_str()).unwrap_or("chatlink")
            )));
        }

        let server_addr = args[1].clone();
        let api_base = args[2].clone();

        let mut local_user = None;
        let mut debounce_ms: Option<u64> = None;
        let mut idle_timeout_ms: Option<u64> = None;

        let mut i = 3;
        while i < args.len() {
            match args[i].as_str() {
                "--user" => {
                    let id = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--user requires an id argument".to_string())
                    })?;
                    local_user = Some(id.clone());
                    i += 2;
                }
                "--debounce-ms" => {
                    let ms = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--debounce-ms requires a value".to_string())
                    })?;
                    debounce_ms = Some(ms.parse::<u64>().map_err(|_| {
                        ChatError::Config("--debounce-ms must be a number".to_string())
                    })?);
                    i += 2;
                }
                "--idle-timeout-ms" => {
                    let ms = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--idle-timeout-ms requires a value".to_string())
                    })?;
                    idle_timeout_ms = Some(ms.parse::<u64>().map_err(|_| {
                        ChatError::Config("--idle-timeout-ms must be a number".to_string())
                    })?);
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(id) = std::env::var("CHATLINK_USER") {
            local_user = Some(id);
        }
        if let Some(ms) = std::env::var("CHATLINK_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            debounce_ms = Some(ms);
        }

        Ok(Self {
            server_addr,
            api_base,
            local_user,
            typing_debounce: Duration::from_millis(
                debounce_ms.unwrap_or(DEFAULT_TYPING_DEBOUNCE_MS),
            ),
            typing_idle_timeout: Duration::from_millis(
                idle_timeout_ms.unwrap_or(DEFAULT_TYPING_IDLE_TIMEOUT_MS),
            ),
            ..Default::default()
        })
    }
}
