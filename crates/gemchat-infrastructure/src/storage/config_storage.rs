//! Config file storage with ACID guarantees.
//!
//! Returns data as `serde_json::Value` (intermediate format) to decouple
//! callers from TOML specifics.

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use super::atomic_file::{StorageError, read_optional, write_atomic};

/// TOML config file accessed as JSON values.
///
/// Responsibilities:
/// - **Atomic read/write** (tmp file + rename under an exclusive lock)
/// - **Format conversion** (TOML ⇄ serde_json::Value)
///
/// It does not know about the settings it stores.
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config file. Missing or blank files are `None`.
    pub fn load(&self) -> Result<Option<JsonValue>, StorageError> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let toml_value: toml::Value = toml::from_str(&content)?;
        Ok(Some(toml_to_json(toml_value)?))
    }

    /// Saves data to the config file atomically.
    pub fn save(&self, data: &JsonValue) -> Result<(), StorageError> {
        let toml_value = json_to_toml(data)?;
        let toml_string = toml::to_string_pretty(&toml_value)?;
        write_atomic(&self.path, toml_string.as_bytes(), false)
    }
}

fn toml_to_json(toml_value: toml::Value) -> Result<JsonValue, StorageError> {
    Ok(serde_json::to_value(toml_value)?)
}

fn json_to_toml(json_value: &JsonValue) -> Result<toml::Value, StorageError> {
    Ok(serde_json::from_value(json_value.clone())?)
}
