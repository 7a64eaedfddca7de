//! Chat endpoint configuration persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://chat.openai.com";
pub const DEFAULT_MODEL: &str = "text-davinci-002-render-sha";

/// Stored chat configuration (persisted to chat-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_session_path")]
    pub session_path: String,
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Wait for the first reply event, and between events afterwards.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_session_path() -> String {
    "/api/auth/session".into()
}
fn default_conversation_path() -> String {
    "/backend-api/conversation".into()
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_timeout() -> u64 {
    60
}
fn default_session_timeout() -> u64 {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_path: default_session_path(),
            conversation_path: default_conversation_path(),
            model: default_model(),
            timeout_secs: default_timeout(),
            session_timeout_secs: default_session_timeout(),
            config_path: PathBuf::new(),
        }
    }
}

impl ChatConfig {
    /// Load config from file, with `WHIPPER_BASE_URL` taking precedence.
    pub fn load(config_path: &Path) -> Self {
        let mut config: ChatConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        if let Ok(base_url) = std::env::var("WHIPPER_BASE_URL") {
            config.base_url = base_url;
        }

        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved chat config to {}", self.config_path.display());
        Ok(())
    }

    /// Config pointing at another host, for tests and mirrors.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }

    pub fn conversation_url(&self) -> String {
        join_url(&self.base_url, &self.conversation_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
