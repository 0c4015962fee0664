//! # Composable Resource Runtime
//!
//! Runtime implementation for the Composable Resource architecture.
//!
//! This crate provides the [`Resource`] handle that wires the core pieces
//! together: it owns the state broadcaster, the lock gate and the event
//! serializer, and dispatches named actions through them.
//!
//! ## Core Components
//!
//! - **Resource**: the reactive state container and its action table
//! - **Lock Gate**: resource-wide cooperative lock for lock-flagged actions
//! - **Event Serializer**: the ordered middleware → reducer → persist → publish path
//! - **File Backend**: one-JSON-file-per-key persistence medium
//!
//! ## Example
//!
//! ```
//! use composable_resource_core::{args, ActionDefinition, ResourceSpec};
//! use composable_resource_runtime::Resource;
//! use serde_json::{Value, json};
//!
//! # tokio_test::block_on(async {
//! let counter = Resource::new(
//!     json!({"count": 0}),
//!     ResourceSpec::new().action(
//!         "add",
//!         ActionDefinition::sync(|s: &Value, args| {
//!             let n: i64 = args.get(0)?;
//!             Ok(json!({"count": s["count"].as_i64().unwrap_or(0) + n}))
//!         }),
//!     ),
//! )?;
//!
//! counter.dispatch("add", args![5]).await?;
//! assert_eq!(counter.state(), json!({"count": 5}));
//! # Ok::<(), composable_resource_core::ResourceError>(())
//! # }).unwrap();
//! ```

use composable_resource_core::middleware::MiddlewareChain;
use composable_resource_core::reducer::MergePolicy;
use std::fmt;
use std::sync::Arc;

/// Resource-wide cooperative lock
pub mod lock;

/// Ordered completion path from epic result to published state
pub mod serializer;

/// File-system persistence backend
pub mod file_store;

/// Prometheus metrics for observability
pub mod metrics;

pub use file_store::FileBackend;
pub use lock::{LockGate, LockGuard};
pub use resource::{ActionHandle, Resource};
pub use serializer::EventSerializer;

/// Default capacity of the completed-action event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Resource configuration
///
/// # Example
///
/// ```
/// use composable_resource_core::{MergePolicy, MiddlewareChain};
/// use composable_resource_runtime::ResourceConfig;
/// use serde_json::Value;
///
/// let config = ResourceConfig::<Value>::default()
///     .with_merge_policy(MergePolicy::Merge)
///     .with_event_capacity(64);
///
/// assert_eq!(config.merge_policy, MergePolicy::Merge);
/// assert!(config.middleware.is_empty());
/// ```
pub struct ResourceConfig<S, D = S> {
    /// Reducer used by actions that do not define their own
    pub merge_policy: MergePolicy,
    /// Stages applied to every epic result before it is reduced
    pub middleware: MiddlewareChain<S, D>,
    /// How many completed-action events a lagging observer may fall behind
    pub event_capacity: usize,
}

impl<S, D> ResourceConfig<S, D> {
    /// Set the default merge policy
    #[must_use]
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Set the middleware chain
    #[must_use]
    pub fn with_middleware(mut self, middleware: MiddlewareChain<S, D>) -> Self {
        self.middleware = middleware;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl<S, D> Default for ResourceConfig<S, D> {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::default(),
            middleware: MiddlewareChain::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl<S, D> Clone for ResourceConfig<S, D> {
    fn clone(&self) -> Self {
        Self {
            merge_policy: self.merge_policy,
            middleware: self.middleware.clone(),
            event_capacity: self.event_capacity,
        }
    }
}

impl<S, D> fmt::Debug for ResourceConfig<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("merge_policy", &self.merge_policy)
            .field("middleware", &self.middleware)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

/// Resource implementation
pub mod resource {
    use super::{Arc, ResourceConfig, fmt};
    use crate::lock::LockGate;
    use crate::metrics::ResourceMetrics;
    use crate::serializer::{EventSerializer, StateSink};
    use composable_resource_core::action::{ActionDefinition, ResourceSpec};
    use composable_resource_core::broadcast::{BroadcastStream, Broadcaster, Subscription};
    use composable_resource_core::epic::Args;
    use composable_resource_core::error::ResourceError;
    use composable_resource_core::event::ActionEvent;
    use composable_resource_core::persistence::{PersistenceAdapter, PersistenceError, StoredEntry};
    use composable_resource_core::reducer::{Merge, ReducerPipeline};
    use futures::future::BoxFuture;
    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::sync::broadcast;

    struct Shared<S, D> {
        actions: HashMap<String, ActionDefinition<S, D>>,
        order: Vec<String>,
        state: Broadcaster<S>,
        lock: LockGate,
        serializer: EventSerializer<S, D>,
    }

    /// A reactive state container with a fixed table of named actions.
    ///
    /// Cloning is cheap and every clone addresses the same resource.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `D`: Type produced by epics and consumed by reducers (defaults to `S`)
    pub struct Resource<S, D = S> {
        shared: Arc<Shared<S, D>>,
    }

    impl<S, D> Resource<S, D>
    where
        S: Merge<D> + Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
    {
        /// Create a resource with the default configuration.
        ///
        /// # Errors
        ///
        /// A configuration error if an action name is empty, reserved or
        /// duplicated.
        pub fn new(initial: S, spec: ResourceSpec<S, D>) -> Result<Self, ResourceError> {
            Self::with_config(initial, spec, ResourceConfig::default())
        }

        /// Create a resource with an explicit configuration.
        ///
        /// # Errors
        ///
        /// A configuration error if an action name is empty, reserved or
        /// duplicated.
        pub fn with_config(
            initial: S,
            spec: ResourceSpec<S, D>,
            config: ResourceConfig<S, D>,
        ) -> Result<Self, ResourceError> {
            Self::build(initial, spec, config, None)
        }

        /// Create a resource whose state lives under `key` in `adapter`.
        ///
        /// The initial state is the stored value, or `default` (written once)
        /// when the key is absent. Every later state is written through
        /// [`PersistenceAdapter::set`] before it is published; a failed write
        /// fails the dispatch and leaves the state unchanged.
        ///
        /// # Errors
        ///
        /// A configuration error for bad action names, or
        /// [`ResourceError::Persistence`] if the seed could not be read,
        /// written or decoded.
        pub async fn persistent<A>(
            adapter: Arc<A>,
            key: impl Into<String>,
            default: S,
            spec: ResourceSpec<S, D>,
            config: ResourceConfig<S, D>,
        ) -> Result<Self, ResourceError>
        where
            A: PersistenceAdapter + ?Sized + 'static,
            S: Serialize + DeserializeOwned,
        {
            spec.validate()?;
            let key = key.into();
            let initial = seed(adapter.as_ref(), &key, default).await?;

            let sink: StateSink<S> = Arc::new(move |_: &str, state: S| -> BoxFuture<'static, Result<(), PersistenceError>> {
                let adapter = Arc::clone(&adapter);
                let key = key.clone();
                Box::pin(async move {
                    let value = to_json(&key, &state)?;
                    adapter.set(&key, value).await
                })
            });

            Self::build(initial, spec, config, Some(sink))
        }

        fn build(
            initial: S,
            spec: ResourceSpec<S, D>,
            config: ResourceConfig<S, D>,
            sink: Option<StateSink<S>>,
        ) -> Result<Self, ResourceError> {
            spec.validate()?;
            Ok(Self::assemble(initial, spec, config, sink))
        }

        /// Wire up an already validated spec.
        fn assemble(
            initial: S,
            spec: ResourceSpec<S, D>,
            config: ResourceConfig<S, D>,
            sink: Option<StateSink<S>>,
        ) -> Self {
            let mut reducers = ReducerPipeline::new(config.merge_policy);
            let mut actions = HashMap::with_capacity(spec.len());
            let mut order = Vec::with_capacity(spec.len());
            for (name, definition) in spec.into_actions() {
                if let Some(reducer) = definition.reducer() {
                    reducers = reducers.with_reducer(name.clone(), Arc::clone(reducer));
                }
                order.push(name.clone());
                actions.insert(name, definition);
            }

            tracing::debug!(
                actions = ?order,
                policy = %config.merge_policy,
                persistent = sink.is_some(),
                "Resource created"
            );

            let state = Broadcaster::new(initial);
            let serializer = EventSerializer::new(
                state.clone(),
                reducers,
                config.middleware,
                sink,
                config.event_capacity,
            );

            Self {
                shared: Arc::new(Shared {
                    actions,
                    order,
                    state,
                    lock: LockGate::new(),
                    serializer,
                }),
            }
        }

        /// Call the action `name` with `args`.
        ///
        /// Resolves with the value the reducer received, after middleware.
        ///
        /// # Errors
        ///
        /// - [`ResourceError::UnknownAction`]: no action with that name
        /// - [`ResourceError::Locked`]: lock-flagged action while the lock is held
        /// - [`ResourceError::Epic`] / [`ResourceError::NoEmission`]: the epic failed
        /// - [`ResourceError::Middleware`]: a middleware stage failed
        /// - [`ResourceError::Persistence`]: the new state could not be written
        ///
        /// On every error the published state is unchanged and the lock, if
        /// taken, is released.
        #[tracing::instrument(skip_all, name = "resource_dispatch", fields(action = %name))]
        pub async fn dispatch(&self, name: &str, args: Args) -> Result<D, ResourceError> {
            let definition = self
                .shared
                .actions
                .get(name)
                .ok_or_else(|| ResourceError::UnknownAction(name.to_string()))?;
            ResourceMetrics::record_dispatch(name);

            let _guard = if definition.is_locked() {
                match self.shared.lock.try_acquire(name) {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        ResourceMetrics::record_locked(name);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let current = self.shared.state.value();
            let epic = (definition.epic())(&current, args.clone());
            tracing::trace!(kind = epic.kind(), "Epic started");

            let data = match epic.settle(name).await {
                Ok(data) => data,
                Err(e) => {
                    ResourceMetrics::record_epic_failure(name);
                    tracing::debug!(error = %e, "Epic failed");
                    return Err(e);
                }
            };

            self.shared.serializer.complete(name, args, data).await
        }

        /// Callable handle for the action `name`.
        ///
        /// # Errors
        ///
        /// [`ResourceError::UnknownAction`] if no such action exists.
        pub fn action(&self, name: &str) -> Result<ActionHandle<S, D>, ResourceError> {
            if self.shared.actions.contains_key(name) {
                Ok(ActionHandle {
                    resource: self.clone(),
                    name: Arc::from(name),
                })
            } else {
                Err(ResourceError::UnknownAction(name.to_string()))
            }
        }

        /// Action names in registration order.
        pub fn actions(&self) -> impl Iterator<Item = &str> {
            self.shared.order.iter().map(String::as_str)
        }

        /// Observe state; the callback sees the current state immediately.
        pub fn subscribe<F>(&self, callback: F) -> Subscription
        where
            F: Fn(&S) + Send + Sync + 'static,
        {
            self.shared.state.subscribe(callback)
        }

        /// Observe the lock flag; the callback sees the current flag immediately.
        pub fn lock_subscribe<F>(&self, callback: F) -> Subscription
        where
            F: Fn(&bool) + Send + Sync + 'static,
        {
            self.shared.lock.subscribe(callback)
        }

        /// State as a stream, starting with the current value.
        #[must_use]
        pub fn stream(&self) -> BroadcastStream<S> {
            self.shared.state.stream()
        }

        /// Lock flag as a stream, starting with the current value.
        #[must_use]
        pub fn lock_stream(&self) -> BroadcastStream<bool> {
            self.shared.lock.stream()
        }

        /// Current state.
        #[must_use]
        pub fn state(&self) -> S {
            self.shared.state.value()
        }

        /// Whether a lock-flagged action is running.
        #[must_use]
        pub fn is_locked(&self) -> bool {
            self.shared.lock.is_locked()
        }

        /// Receive every completed action from now on.
        #[must_use]
        pub fn subscribe_events(&self) -> broadcast::Receiver<ActionEvent<D>> {
            self.shared.serializer.subscribe_events()
        }

        /// Number of completed actions folded into the state.
        pub async fn sequence(&self) -> u64 {
            self.shared.serializer.sequence().await
        }
    }

    impl<S> Resource<S, S>
    where
        S: Merge + Clone + DeserializeOwned + Send + Sync + 'static,
    {
        /// Resource with a single `set` action that replaces the state with
        /// its first argument.
        #[must_use]
        pub fn naive(initial: S) -> Self {
            let spec = ResourceSpec::new().action("set", set_definition());
            Self::assemble(initial, spec, ResourceConfig::default(), None)
        }
    }

    impl Resource<Value, Value> {
        /// Persistent resource with `set` and `del` actions.
        ///
        /// `set` makes its first argument the state and writes it under `key`.
        /// `del` resets the state to `default` and removes the stored entry.
        /// Both go through the same write-before-publish path as
        /// [`Resource::persistent`], so the stored entry always follows the
        /// published state; a failed write fails the call.
        ///
        /// # Errors
        ///
        /// [`ResourceError::Persistence`] if the seed could not be read or written.
        pub async fn naive_persistent<A>(
            adapter: Arc<A>,
            key: impl Into<String>,
            default: Value,
        ) -> Result<Self, ResourceError>
        where
            A: PersistenceAdapter + ?Sized + 'static,
        {
            let key: Arc<str> = Arc::from(key.into());
            let initial = seed(adapter.as_ref(), &key, default.clone()).await?;

            let del = ActionDefinition::<Value, Value>::sync(move |_: &Value, _: Args| Ok(default.clone()))
                .with_reducer(|_, data| data);

            let sink: StateSink<Value> = Arc::new(move |action: &str, state: Value| -> BoxFuture<'static, Result<(), PersistenceError>> {
                let adapter = Arc::clone(&adapter);
                let key = Arc::clone(&key);
                let remove = action == "del";
                Box::pin(async move {
                    if remove {
                        adapter.del(&key).await
                    } else {
                        adapter.set(&key, state).await
                    }
                })
            });

            let spec = ResourceSpec::new()
                .action("set", set_definition())
                .action("del", del);
            Ok(Self::assemble(initial, spec, ResourceConfig::default(), Some(sink)))
        }
    }

    fn set_definition<S>() -> ActionDefinition<S, S>
    where
        S: DeserializeOwned + Send + 'static,
    {
        ActionDefinition::sync(|_: &S, args: Args| Ok(args.get::<S>(0)?)).with_reducer(|_, data| data)
    }

    async fn seed<A, S>(adapter: &A, key: &str, default: S) -> Result<S, ResourceError>
    where
        A: PersistenceAdapter + ?Sized,
        S: Serialize + DeserializeOwned,
    {
        let handle = adapter.get(key, to_json(key, &default)?).await?;
        match handle.value() {
            StoredEntry::Value(value) => {
                serde_json::from_value(value).map_err(|source| {
                    ResourceError::Persistence(PersistenceError::Serialization {
                        key: key.to_string(),
                        source,
                    })
                })
            }
            StoredEntry::Deleted => {
                // A live handle that was deleted leaves nothing stored.
                adapter.set(key, to_json(key, &default)?).await?;
                Ok(default)
            }
        }
    }

    fn to_json<S: Serialize>(key: &str, state: &S) -> Result<Value, PersistenceError> {
        serde_json::to_value(state).map_err(|source| PersistenceError::Serialization {
            key: key.to_string(),
            source,
        })
    }

    impl<S, D> Clone for Resource<S, D> {
        fn clone(&self) -> Self {
            Self {
                shared: Arc::clone(&self.shared),
            }
        }
    }

    impl<S, D> fmt::Debug for Resource<S, D> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Resource")
                .field("actions", &self.shared.order)
                .field("lock", &self.shared.lock)
                .field("serializer", &self.shared.serializer)
                .finish_non_exhaustive()
        }
    }

    /// One action of a [`Resource`], callable on its own.
    pub struct ActionHandle<S, D = S> {
        resource: Resource<S, D>,
        name: Arc<str>,
    }

    impl<S, D> ActionHandle<S, D>
    where
        S: Merge<D> + Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
    {
        /// Dispatch this action.
        ///
        /// # Errors
        ///
        /// Same as [`Resource::dispatch`].
        pub async fn call(&self, args: Args) -> Result<D, ResourceError> {
            self.resource.dispatch(&self.name, args).await
        }

        /// Action name.
        #[must_use]
        pub fn name(&self) -> &str {
            &self.name
        }
    }

    impl<S, D> Clone for ActionHandle<S, D> {
        fn clone(&self) -> Self {
            Self {
                resource: self.resource.clone(),
                name: Arc::clone(&self.name),
            }
        }
    }

    impl<S, D> fmt::Debug for ActionHandle<S, D> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ActionHandle").field("name", &self.name).finish()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use composable_resource_core::{ActionDefinition, Epic, ResourceError, ResourceSpec, args};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn counter_spec() -> ResourceSpec<Value, Value> {
        ResourceSpec::new()
            .action(
                "add",
                ActionDefinition::sync(|s: &Value, args| {
                    let n: i64 = args.get(0)?;
                    Ok(json!({"count": s["count"].as_i64().unwrap_or(0) + n}))
                }),
            )
            .action(
                "fail",
                ActionDefinition::new(|_: &Value, _| Epic::fail(anyhow::anyhow!("nope"))),
            )
    }

    #[tokio::test]
    async fn test_fresh_subscriber_sees_current_state() {
        let resource = Resource::new(json!({"count": 0}), counter_spec()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let _sub = resource.subscribe(move |s| sink.lock().unwrap().push(s.clone()));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"count": 0})]);

        resource.dispatch("add", args![2]).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"count": 0}), json!({"count": 2})]
        );
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let resource = Resource::new(json!({}), counter_spec()).unwrap();
        assert!(matches!(
            resource.dispatch("sub", args![1]).await,
            Err(ResourceError::UnknownAction(n)) if n == "sub"
        ));
        assert!(resource.action("sub").is_err());
    }

    #[tokio::test]
    async fn test_failed_epic_leaves_state() {
        let resource = Resource::new(json!({"count": 1}), counter_spec()).unwrap();
        let err = resource.dispatch("fail", args![]).await.unwrap_err();

        assert_eq!(err.epic_error().unwrap().to_string(), "nope");
        assert_eq!(resource.state(), json!({"count": 1}));
        assert_eq!(resource.sequence().await, 0);
    }

    #[tokio::test]
    async fn test_bad_argument_is_an_epic_failure() {
        let resource = Resource::new(json!({"count": 1}), counter_spec()).unwrap();
        let err = resource.dispatch("add", args!["two"]).await.unwrap_err();
        assert!(err.epic_error().is_some());
    }

    #[tokio::test]
    async fn test_action_handle() {
        let resource = Resource::new(json!({"count": 0}), counter_spec()).unwrap();
        let add = resource.action("add").unwrap();

        assert_eq!(add.name(), "add");
        assert_eq!(add.call(args![3]).await.unwrap(), json!({"count": 3}));
        assert_eq!(resource.actions().collect::<Vec<_>>(), vec!["add", "fail"]);
    }

    #[tokio::test]
    async fn test_reserved_name_rejected() {
        let spec = ResourceSpec::new().action("next", ActionDefinition::sync(|s: &Value, _| Ok(s.clone())));
        let err = Resource::new(json!(null), spec).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_naive_set() {
        let resource = Resource::naive(json!("a"));
        resource.dispatch("set", args!["b"]).await.unwrap();
        assert_eq!(resource.state(), json!("b"));
        assert_eq!(resource.actions().collect::<Vec<_>>(), vec!["set"]);
    }

    #[test]
    fn test_config_builder() {
        let config = ResourceConfig::<Value>::default().with_event_capacity(0);
        assert_eq!(config.event_capacity, 0);
        assert_eq!(config.merge_policy, MergePolicy::Replace);
    }
}
