//! Directory-backed [`StorageBackend`]: one JSON document per key.
//!
//! Keys are escaped into file names, so any string is a valid key. Each write
//! goes to its own temporary sibling and is renamed into place, so a reader
//! never observes a half-written document and overlapping writes of one key
//! never share a temporary file.

use composable_resource_core::persistence::{PersistenceError, PersistenceFuture, StorageBackend};
use serde_json::Value;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes temporary files of writes in flight within this process.
static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// Stores each key as `<dir>/<escaped key>.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Backend rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }

    /// Fresh temporary file for one write of `key`.
    fn temp_path_for(&self, key: &str) -> PathBuf {
        let n = NEXT_TEMP.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{n}.tmp",
            escape_key(key),
            std::process::id()
        ))
    }
}

/// Keep `[A-Za-z0-9_-]`, percent-encode every other byte.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn io_error(key: &str, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        key: key.to_string(),
        source,
    }
}

impl StorageBackend for FileBackend {
    fn read<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, Option<Value>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(self.path_for(key)).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(io_error(key, e)),
            };
            serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| PersistenceError::Serialization {
                    key: key.to_string(),
                    source,
                })
        })
    }

    fn write<'a>(&'a self, key: &'a str, value: &'a Value) -> PersistenceFuture<'a, ()> {
        Box::pin(async move {
            let bytes = serde_json::to_vec_pretty(value).map_err(|source| {
                PersistenceError::Serialization {
                    key: key.to_string(),
                    source,
                }
            })?;

            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| io_error(key, e))?;

            let path = self.path_for(key);
            let tmp = self.temp_path_for(key);
            if let Err(e) = tokio::fs::write(&tmp, bytes).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(io_error(key, e));
            }
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(io_error(key, e));
            }

            tracing::trace!(key, path = %path.display(), "Wrote stored value");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.path_for(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(key, e)),
            }
        })
    }
}
