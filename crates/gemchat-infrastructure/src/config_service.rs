//! Loads `config.toml` into [`AppConfig`].

use std::path::PathBuf;

use gemchat_core::config::AppConfig;
use gemchat_core::Result;

use crate::storage::ConfigStorage;

/// Reads application settings, writing the defaults on first run.
pub struct ConfigService {
    storage: ConfigStorage,
}

impl ConfigService {
    pub fn new(path: PathBuf) -> Self {
        Self {
            storage: ConfigStorage::new(path),
        }
    }

    /// Returns the stored settings.
    ///
    /// A missing file is created with defaults. An unreadable file is left
    /// in place and the defaults are used.
    pub fn load(&self) -> AppConfig {
        match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "[ConfigService] Failed to load {}: {}. Using defaults.",
                    self.storage.path().display(),
                    e
                );
                AppConfig::default()
            }
        }
    }

    fn try_load(&self) -> Result<AppConfig> {
        match self.storage.load()? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => {
                let config = AppConfig::default();
                self.save(&config)?;
                tracing::info!(
                    "[ConfigService] Wrote default config to {}",
                    self.storage.path().display()
                );
                Ok(config)
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let value = serde_json::to_value(config)?;
        self.storage.save(&value)?;
        Ok(())
    }
}
