//! Persistence contracts for seeding and recording resource state.
//!
//! Two layers:
//!
//! - [`StorageBackend`]: the raw medium (memory, files, a browser store, ...)
//!   with plain `read` / `write` / `remove` of JSON values.
//! - [`PersistenceAdapter`]: the contract a resource talks to. `get` returns a
//!   *live handle* for a key, a [`Broadcaster`] that is notified by every
//!   later `set` and `del` on that key.
//!
//! [`KeyValueStore`] implements the adapter on top of any backend.
//!
//! # Example
//!
//! ```
//! use composable_resource_core::persistence::{
//!     KeyValueStore, MemoryBackend, PersistenceAdapter, StoredEntry,
//! };
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = KeyValueStore::new(MemoryBackend::new());
//!
//! let handle = store.get("theme", json!("light")).await?;
//! assert_eq!(handle.value(), StoredEntry::Value(json!("light")));
//!
//! store.set("theme", json!("dark")).await?;
//! assert_eq!(handle.value(), StoredEntry::Value(json!("dark")));
//!
//! store.del("theme").await?;
//! assert_eq!(handle.value(), StoredEntry::Deleted);
//! # Ok::<(), composable_resource_core::persistence::PersistenceError>(())
//! # }).unwrap();
//! ```

use crate::broadcast::Broadcaster;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors from a persistence medium.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The medium failed to read or write.
    #[error("I/O error for key \"{key}\": {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A value could not be converted to or from JSON.
    #[error("serialization error for key \"{key}\": {source}")]
    Serialization {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Any other backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Value carried by a live handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredEntry {
    /// The key holds this value.
    Value(Value),
    /// The key was removed by [`PersistenceAdapter::del`].
    Deleted,
}

impl StoredEntry {
    /// The value, unless the entry was deleted.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Deleted => None,
        }
    }

    /// Whether this is the deletion marker.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// Boxed future returned by persistence operations.
pub type PersistenceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

/// Raw key-value medium.
///
/// Uses explicit boxed futures so backends can be used as trait objects.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn read<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write<'a>(&'a self, key: &'a str, value: &'a Value) -> PersistenceFuture<'a, ()>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()>;
}

/// Contract between a resource and its durable store.
pub trait PersistenceAdapter: Send + Sync {
    /// Live handle for `key`.
    ///
    /// The first call for a key reads the medium, writes `default` if the key
    /// is absent, and registers a handle holding the resolved value. Later
    /// calls return the registered handle without touching the medium.
    fn get<'a>(&'a self, key: &'a str, default: Value) -> PersistenceFuture<'a, Broadcaster<StoredEntry>>;

    /// Write `value` and notify the live handle for `key`, if one exists.
    fn set<'a>(&'a self, key: &'a str, value: Value) -> PersistenceFuture<'a, ()>;

    /// Remove `key` and notify the live handle with [`StoredEntry::Deleted`].
    fn del<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()>;
}

/// [`PersistenceAdapter`] over a [`StorageBackend`], with one live handle per key.
pub struct KeyValueStore<B> {
    backend: B,
    handles: tokio::sync::Mutex<HashMap<String, Broadcaster<StoredEntry>>>,
}

impl<B: StorageBackend> KeyValueStore<B> {
    /// Wrap `backend`.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handles: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The underlying medium.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether a live handle exists for `key`.
    pub async fn is_registered(&self, key: &str) -> bool {
        self.handles.lock().await.contains_key(key)
    }

    async fn handle(&self, key: &str) -> Option<Broadcaster<StoredEntry>> {
        self.handles.lock().await.get(key).cloned()
    }
}

impl<B: StorageBackend> PersistenceAdapter for KeyValueStore<B> {
    fn get<'a>(&'a self, key: &'a str, default: Value) -> PersistenceFuture<'a, Broadcaster<StoredEntry>> {
        Box::pin(async move {
            // Held across the read so two first calls for a key cannot both write the default.
            let mut handles = self.handles.lock().await;
            if let Some(handle) = handles.get(key) {
                return Ok(handle.clone());
            }

            let value = match self.backend.read(key).await? {
                Some(stored) => stored,
                None => {
                    tracing::debug!(key, "No stored value, writing default");
                    self.backend.write(key, &default).await?;
                    default
                }
            };

            let handle = Broadcaster::new(StoredEntry::Value(value));
            handles.insert(key.to_string(), handle.clone());
            Ok(handle)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> PersistenceFuture<'a, ()> {
        Box::pin(async move {
            self.backend.write(key, &value).await?;
            if let Some(handle) = self.handle(key).await {
                handle.publish(StoredEntry::Value(value));
            }
            Ok(())
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()> {
        Box::pin(async move {
            self.backend.remove(key).await?;
            if let Some(handle) = self.handle(key).await {
                handle.publish(StoredEntry::Deleted);
            }
            Ok(())
        })
    }
}

impl<B> std::fmt::Debug for KeyValueStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore").finish_non_exhaustive()
    }
}

/// In-process [`StorageBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
    /// Empty medium.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Medium pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Value currently stored under `key`.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn read<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, Option<Value>> {
        let value = self.peek(key);
        Box::pin(async move { Ok(value) })
    }

    fn write<'a>(&'a self, key: &'a str, value: &'a Value) -> PersistenceFuture<'a, ()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Box::pin(async { Ok(()) })
    }
}
