//! Storage layer for atomic file operations.

mod atomic_file;
mod config_storage;
mod json_store;

pub use atomic_file::{StorageError, write_atomic};
pub use config_storage::ConfigStorage;
pub use json_store::JsonKeyValueStore;
