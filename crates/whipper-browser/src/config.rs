//! Driven browser configuration persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Persisted browser configuration (`browser/config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Explicit Chrome/Chromium executable. Discovered on PATH when unset.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_debugging_port")]
    pub debugging_port: u16,
    #[serde(default = "default_start_url")]
    pub start_url: String,
    /// Persistent profile directory. Defaults to `browser/profile`.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
    /// Cookie domains forwarded to the chat service.
    #[serde(default = "default_cookie_domains")]
    pub cookie_domains: Vec<String>,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_debugging_port() -> u16 {
    9333
}
fn default_start_url() -> String {
    "https://chat.openai.com/".into()
}
fn default_launch_timeout() -> u64 {
    20
}
fn default_cookie_domains() -> Vec<String> {
    vec!["openai.com".into(), "chatgpt.com".into()]
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            debugging_port: default_debugging_port(),
            start_url: default_start_url(),
            user_data_dir: None,
            launch_timeout_secs: default_launch_timeout(),
            cookie_domains: default_cookie_domains(),
            config_path: PathBuf::new(),
        }
    }
}

impl BrowserConfig {
    /// Load config from a JSON file, or return defaults.
    pub fn load(config_dir: &Path) -> Self {
        let config_path = config_dir.join("config.json");
        let mut config: BrowserConfig = std::fs::read_to_string(&config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        config.config_path = config_path;
        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)
    }

    /// Profile directory for the given browser data dir.
    pub fn profile_dir(&self, data_dir: &Path) -> PathBuf {
        self.user_data_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("profile"))
    }
}
