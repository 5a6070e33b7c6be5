//! Path management for gemchat files.
//!
//! Default locations come from `version_migrate::AppPaths`, so they follow
//! the platform conventions. A custom root replaces all of them, which the
//! CLI exposes as `--config-dir` and tests use with a temp directory.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/gemchat/           # Config directory
//! ├── config.toml              # Application settings
//! ├── credentials.json         # API key and model (0600 on Unix)
//! ├── conversations.json       # Conversation archive
//! ├── *.lock                   # Write locks, kept between runs
//! └── logs/
//!     └── gemchat.log          # Appended across runs
//! ```

use std::path::{Path, PathBuf};

use version_migrate::AppPaths;

use gemchat_core::{GemchatError, Result};

const APP_NAME: &str = "gemchat";

#[derive(Debug, Clone)]
pub struct GemchatPaths {
    root: PathBuf,
}

impl GemchatPaths {
    /// Uses the platform config directory for gemchat.
    pub fn from_platform() -> Result<Self> {
        let root = AppPaths::new(APP_NAME)
            .config_dir()
            .map_err(|_| GemchatError::config("Cannot find home directory"))?;
        Ok(Self { root })
    }

    /// Keeps every file under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `with_root` when a directory is given, the platform default otherwise.
    pub fn resolve(custom_root: Option<PathBuf>) -> Result<Self> {
        match custom_root {
            Some(root) => Ok(Self::with_root(root)),
            None => Self::from_platform(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory holding the JSON key-value documents.
    pub fn store_dir(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("gemchat.log")
    }
}
