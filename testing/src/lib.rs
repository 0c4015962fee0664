//! # Composable Resource Testing
//!
//! Testing utilities and helpers for the Composable Resource architecture.
//!
//! This crate provides:
//! - A persistence backend that counts operations and injects failures
//! - A recorder that collects every value a subscription delivers
//! - A Given-When-Then helper for reducer pipelines
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use composable_resource_testing::{Recorder, RecordingBackend};
//!
//! #[tokio::test]
//! async fn test_counter_is_persisted() {
//!     let store = Arc::new(KeyValueStore::new(RecordingBackend::new()));
//!     let counter = Resource::persistent(store.clone(), "counter", json!({"count": 0}), spec(), config()).await?;
//!
//!     let recorder = Recorder::new();
//!     let _sub = counter.subscribe(recorder.callback());
//!
//!     counter.dispatch("add", args![5]).await?;
//!
//!     assert_eq!(recorder.values(), vec![json!({"count": 0}), json!({"count": 5})]);
//!     assert_eq!(store.backend().writes(), 2);
//! }
//! ```

use chrono::{DateTime, Utc};

/// Given-When-Then helper for reducer pipelines
pub mod reducer_test;

/// Mock implementations for testing.
pub mod mocks {
    use super::{DateTime, Utc};
    use composable_resource_core::persistence::{
        MemoryBackend, PersistenceError, PersistenceFuture, StorageBackend,
    };
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// [`StorageBackend`] that counts every operation and can be told to fail.
    ///
    /// Values live in an inner [`MemoryBackend`].
    ///
    /// # Example
    ///
    /// ```
    /// use composable_resource_core::persistence::StorageBackend;
    /// use composable_resource_testing::mocks::RecordingBackend;
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let backend = RecordingBackend::new();
    /// backend.write("k", &json!(1)).await.unwrap();
    ///
    /// backend.fail_writes(true);
    /// assert!(backend.write("k", &json!(2)).await.is_err());
    ///
    /// assert_eq!(backend.writes(), 1);
    /// assert_eq!(backend.inner().peek("k"), Some(json!(1)));
    /// # });
    /// ```
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        inner: MemoryBackend,
        reads: AtomicUsize,
        writes: AtomicUsize,
        removes: AtomicUsize,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl RecordingBackend {
        /// Empty backend.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Backend pre-populated with `entries`.
        #[must_use]
        pub fn with_entries<I, K>(entries: I) -> Self
        where
            I: IntoIterator<Item = (K, Value)>,
            K: Into<String>,
        {
            Self {
                inner: MemoryBackend::with_entries(entries),
                ..Self::default()
            }
        }

        /// The medium holding the values.
        #[must_use]
        pub const fn inner(&self) -> &MemoryBackend {
            &self.inner
        }

        /// Successful reads so far.
        #[must_use]
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        /// Successful writes so far.
        #[must_use]
        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Successful removes so far.
        #[must_use]
        pub fn removes(&self) -> usize {
            self.removes.load(Ordering::SeqCst)
        }

        /// Make every later read fail (or succeed again).
        pub fn fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        /// Make every later write and remove fail (or succeed again).
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    fn injected(operation: &str, key: &str) -> PersistenceError {
        PersistenceError::Backend(format!("injected {operation} failure for \"{key}\""))
    }

    impl StorageBackend for RecordingBackend {
        fn read<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, Option<Value>> {
            Box::pin(async move {
                if self.fail_reads.load(Ordering::SeqCst) {
                    return Err(injected("read", key));
                }
                let value = self.inner.read(key).await?;
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }

        fn write<'a>(&'a self, key: &'a str, value: &'a Value) -> PersistenceFuture<'a, ()> {
            Box::pin(async move {
                if self.fail_writes.load(Ordering::SeqCst) {
                    return Err(injected("write", key));
                }
                self.inner.write(key, value).await?;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }

        fn remove<'a>(&'a self, key: &'a str) -> PersistenceFuture<'a, ()> {
            Box::pin(async move {
                if self.fail_writes.load(Ordering::SeqCst) {
                    return Err(injected("remove", key));
                }
                self.inner.remove(key).await?;
                self.removes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    /// Fixed timestamp for deterministic events (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::fmt;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Collects every value delivered to a subscription callback.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_resource_core::Broadcaster;
    /// use composable_resource_testing::Recorder;
    ///
    /// let numbers = Broadcaster::new(1);
    /// let recorder = Recorder::new();
    /// let _sub = numbers.subscribe(recorder.callback());
    ///
    /// numbers.publish(2);
    /// assert_eq!(recorder.values(), vec![1, 2]);
    /// ```
    pub struct Recorder<T> {
        values: Arc<Mutex<Vec<T>>>,
    }

    impl<T: Clone + Send + 'static> Recorder<T> {
        /// Empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self {
                values: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Callback that appends each delivered value.
        #[must_use]
        pub fn callback(&self) -> impl Fn(&T) + Send + Sync + 'static {
            let values = Arc::clone(&self.values);
            move |value: &T| {
                values
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(value.clone());
            }
        }

        /// Everything recorded so far, oldest first.
        #[must_use]
        pub fn values(&self) -> Vec<T> {
            self.lock().clone()
        }

        /// Most recent value.
        #[must_use]
        pub fn last(&self) -> Option<T> {
            self.lock().last().cloned()
        }

        /// Number of recorded values.
        #[must_use]
        pub fn len(&self) -> usize {
            self.lock().len()
        }

        /// Whether nothing was recorded.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.lock().is_empty()
        }

        /// Forget everything recorded so far.
        pub fn clear(&self) {
            self.lock().clear();
        }

        fn lock(&self) -> MutexGuard<'_, Vec<T>> {
            self.values.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T: Clone + Send + 'static> Default for Recorder<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> Clone for Recorder<T> {
        fn clone(&self) -> Self {
            Self {
                values: Arc::clone(&self.values),
            }
        }
    }

    impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            f.debug_struct("Recorder").field("values", &*values).finish()
        }
    }

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; output is captured by the test harness.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Scalar JSON values.
    pub fn json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    /// Flat JSON objects with up to `max_keys` short keys.
    pub fn json_object(max_keys: usize) -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-e]", json_scalar(), 0..=max_keys)
            .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<String, Value>>()))
    }

    /// Counter deltas small enough that sums never overflow.
    pub fn delta() -> impl Strategy<Value = i64> {
        -1_000_i64..1_000
    }
}

// Re-export commonly used items
pub use helpers::{Recorder, init_test_tracing};
pub use mocks::{RecordingBackend, test_clock};
pub use reducer_test::{ReducerTest, assertions};
