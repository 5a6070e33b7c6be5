//! Atomic file replacement with an exclusive lock.
//!
//! Writers go through a temp file in the same directory, fsync it and rename
//! it over the target, so readers see either the old or the new content.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use gemchat_core::GemchatError;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// File I/O error.
    IoError(std::io::Error),
    /// JSON parse or conversion error.
    JsonError(serde_json::Error),
    /// TOML parsing error.
    TomlParseError(toml::de::Error),
    /// TOML serialization error.
    TomlSerError(toml::ser::Error),
    /// File locking error.
    LockError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(e) => write!(f, "I/O error: {}", e),
            StorageError::JsonError(e) => write!(f, "JSON error: {}", e),
            StorageError::TomlParseError(e) => write!(f, "TOML parse error: {}", e),
            StorageError::TomlSerError(e) => write!(f, "TOML serialization error: {}", e),
            StorageError::LockError(e) => write!(f, "Lock error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::IoError(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::JsonError(e)
    }
}

impl From<toml::de::Error> for StorageError {
    fn from(e: toml::de::Error) -> Self {
        StorageError::TomlParseError(e)
    }
}

impl From<toml::ser::Error> for StorageError {
    fn from(e: toml::ser::Error) -> Self {
        StorageError::TomlSerError(e)
    }
}

impl From<StorageError> for GemchatError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::IoError(io) => io.into(),
            StorageError::JsonError(json) => json.into(),
            StorageError::TomlParseError(de) => de.into(),
            StorageError::TomlSerError(ser) => ser.into(),
            StorageError::LockError(message) => GemchatError::io(message),
        }
    }
}

/// Replaces `path` with `contents` atomically while holding the file lock.
///
/// With `private` set, the file is created with owner-only permissions on Unix.
pub fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let _lock = FileLock::acquire(path)?;

    let tmp_path = temp_path(path)?;
    let mut tmp_file = File::create(&tmp_path)?;

    #[cfg(unix)]
    {
        if private {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    tmp_file.write_all(contents)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Removes `path` under the file lock. A missing file is not an error.
pub(crate) fn remove_locked(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        return Ok(());
    }
    let _lock = FileLock::acquire(path)?;
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads `path` as text. Missing or blank files read as `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> Result<PathBuf, StorageError> {
    let parent = path.parent().ok_or_else(|| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;

    let file_name = path.file_name().ok_or_else(|| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no file name",
        ))
    })?;

    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// Exclusive lock on `<path>.lock`, released when the handle is dropped.
///
/// The lock file itself is never deleted: unlinking it would let a waiter
/// holding the old inode and a newcomer on a fresh file both proceed.
struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StorageError> {
        let lock_path = path.with_extension("lock");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| StorageError::LockError(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(FileLock { file })
    }
}
