//! Server and client configuration.
//!
//! Server configuration is resolved in layers:
//! - built-in defaults
//! - TOML file named by `CHAT_CONFIG`
//! - environment variables (`CHAT_BIND_ADDR`, `CHAT_TYPING_TIMEOUT_MS`)
//! - first command line argument as bind address

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:5001";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Typing indicator expiry in milliseconds.
    #[serde(default = "default_typing_timeout")]
    pub typing_timeout_ms: u64,

    /// Buffer size of the session manager's command queue.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Buffer size of each connection's outbound queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_bind_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_typing_timeout() -> u64 {
    3_000
}

fn default_command_buffer() -> usize {
    256
}

fn default_outbound_buffer() -> usize {
    32
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            typing_timeout_ms: default_typing_timeout(),
            command_buffer: default_command_buffer(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl ServerConfig {
    /// Resolve configuration from file, environment and arguments.
    pub fn load(args: impl IntoIterator<Item = String>) -> Result<Self, AppError> {
        let mut config = match std::env::var("CHAT_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        if let Some(addr) = args.into_iter().nth(1) {
            config.bind_addr = addr;
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply `CHAT_*` overrides using the given variable lookup.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), AppError> {
        if let Some(addr) = var("CHAT_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(ms) = var("CHAT_TYPING_TIMEOUT_MS") {
            self.typing_timeout_ms = ms
                .parse()
                .map_err(|_| AppError::Config(format!("invalid CHAT_TYPING_TIMEOUT_MS: {}", ms)))?;
        }
        Ok(())
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }
}

/// Client-side reconnection policy
///
/// Fixed delay between attempts, bounded attempt count. A successful
/// connection resets the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1_000),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("CHAT_SERVER_URL")
                .unwrap_or_else(|_| format!("ws://{}", DEFAULT_ADDR)),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
