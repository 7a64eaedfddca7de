//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to all Whipper data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Prompt registry (`data/prompts.json`).
    pub prompts_file: PathBuf,
    /// Per-prompt result caches (`data/results/`).
    pub results: PathBuf,
    /// Saved input tables (`data/inputs/`).
    pub inputs: PathBuf,
    /// Browser config and persistent profile (`data/browser/`).
    pub browser: PathBuf,
    /// Chat endpoint configuration (`data/chat-config.json`).
    pub chat_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            prompts_file: root.join("prompts.json"),
            results: root.join("results"),
            inputs: root.join("inputs"),
            browser: root.join("browser"),
            chat_config_file: root.join("chat-config.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.results)?;
        std::fs::create_dir_all(&self.inputs)?;
        std::fs::create_dir_all(&self.browser)?;
        Ok(())
    }
}

/// Top-level Whipper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhipperConfig {
    /// Dashboard API port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
}

impl WhipperConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3004);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self { port, data_paths })
    }
}
