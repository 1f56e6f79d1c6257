//! Persistence layer: atomic JSON documents on the local filesystem.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read and decode a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read a JSON document, falling back to `T::default()` when the file does not exist.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    match read_json(path) {
        Err(StorageError::NotFound(_)) => Ok(T::default()),
        other => other,
    }
}

/// Write `value` as pretty JSON via a temp file in the same directory, fsync, then rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let encoded = serde_json::to_vec_pretty(value).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to encode {}: {}", path.display(), e),
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&encoded)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::IoError(e.error))?;
    Ok(())
}
