//! Local key-value storage: one JSON document per key.
//!
//! Keys map to `<dir>/<key>.json`. The store only deals in raw
//! `serde_json::Value`s; schema versions and migrations belong to the
//! repositories built on top of it.

use std::path::PathBuf;

use serde_json::Value as JsonValue;

use super::atomic_file::{StorageError, read_optional, remove_locked, write_atomic};

#[derive(Debug, Clone)]
pub struct JsonKeyValueStore {
    dir: PathBuf,
}

impl JsonKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Reads the value under `key`. Missing or blank documents are `None`.
    pub fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError> {
        match read_optional(&self.path_for(key))? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    /// Stores a serialized document under `key`.
    pub fn put(&self, key: &str, document: &str) -> Result<(), StorageError> {
        write_atomic(&self.path_for(key), document.as_bytes(), false)
    }

    /// Like [`put`](Self::put), but readable by the owner only.
    pub fn put_private(&self, key: &str, document: &str) -> Result<(), StorageError> {
        write_atomic(&self.path_for(key), document.as_bytes(), true)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        remove_locked(&self.path_for(key))
    }
}
