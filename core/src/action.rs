//! Action definitions and the resource specification table.
//!
//! A [`ResourceSpec`] is an ordered, explicit table of named
//! [`ActionDefinition`]s. It is validated once, when the resource is built:
//! names must be non-empty, unique, and must not be one of
//! [`RESERVED_ACTION_NAMES`].

use crate::epic::{Args, Epic};
use crate::error::ResourceError;
use crate::reducer::ReducerFn;
use futures::{Future, Stream};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Names that may never be used for actions.
///
/// These are the member names of a resource's stream surface; an action
/// with one of these names would shadow it.
pub const RESERVED_ACTION_NAMES: [&str; 19] = [
    "value",
    "getValue",
    "next",
    "observers",
    "closed",
    "isStopped",
    "hasError",
    "thrownError",
    "lift",
    "error",
    "complete",
    "unsubscribe",
    "asObservable",
    "source",
    "operator",
    "pipe",
    "subscribe",
    "forEach",
    "toPromise",
];

/// Whether `name` is in [`RESERVED_ACTION_NAMES`].
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_ACTION_NAMES.contains(&name)
}

/// An epic: `(current state, call arguments) -> Epic`.
pub type EpicFn<S, D> = Arc<dyn Fn(&S, Args) -> Epic<D> + Send + Sync>;

/// One named action: its epic, an optional reducer, and whether it takes the resource lock.
pub struct ActionDefinition<S, D> {
    epic: EpicFn<S, D>,
    reducer: Option<ReducerFn<S, D>>,
    lock: bool,
}

impl<S, D> ActionDefinition<S, D>
where
    S: 'static,
    D: Send + 'static,
{
    /// Action whose epic returns an [`Epic`] directly.
    pub fn new<F>(epic: F) -> Self
    where
        F: Fn(&S, Args) -> Epic<D> + Send + Sync + 'static,
    {
        Self {
            epic: Arc::new(epic),
            reducer: None,
            lock: false,
        }
    }

    /// Action whose epic computes its result synchronously.
    ///
    /// ```
    /// use composable_resource_core::action::ActionDefinition;
    /// use serde_json::{Value, json};
    ///
    /// let add = ActionDefinition::sync(|s: &Value, args| {
    ///     let n: i64 = args.get(0)?;
    ///     Ok(json!({"count": s["count"].as_i64().unwrap_or(0) + n}))
    /// });
    /// assert!(!add.is_locked());
    /// ```
    pub fn sync<F>(epic: F) -> Self
    where
        F: Fn(&S, Args) -> anyhow::Result<D> + Send + Sync + 'static,
    {
        Self::new(move |state, args| Epic::Ready(epic(state, args)))
    }

    /// Action whose epic is an async function of an owned state snapshot.
    pub fn future<F, Fut>(epic: F) -> Self
    where
        S: Clone,
        F: Fn(S, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<D>> + Send + 'static,
    {
        Self::new(move |state: &S, args| Epic::future(epic(state.clone(), args)))
    }

    /// Action whose epic returns a stream; only its first item is used.
    pub fn stream<F, St>(epic: F) -> Self
    where
        S: Clone,
        F: Fn(S, Args) -> St + Send + Sync + 'static,
        St: Stream<Item = anyhow::Result<D>> + Send + 'static,
    {
        Self::new(move |state: &S, args| Epic::stream(epic(state.clone(), args)))
    }

    /// Use `reducer` instead of the resource's default policy.
    #[must_use]
    pub fn with_reducer<R>(mut self, reducer: R) -> Self
    where
        R: Fn(&S, D) -> S + Send + Sync + 'static,
    {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    /// Make the action take the resource lock while its epic runs.
    #[must_use]
    pub const fn locked(mut self) -> Self {
        self.lock = true;
        self
    }
}

impl<S, D> ActionDefinition<S, D> {
    /// The epic.
    #[must_use]
    pub const fn epic(&self) -> &EpicFn<S, D> {
        &self.epic
    }

    /// The action's own reducer, if any.
    #[must_use]
    pub const fn reducer(&self) -> Option<&ReducerFn<S, D>> {
        self.reducer.as_ref()
    }

    /// Whether the action participates in the resource lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock
    }
}

impl<S, D> Clone for ActionDefinition<S, D> {
    fn clone(&self) -> Self {
        Self {
            epic: Arc::clone(&self.epic),
            reducer: self.reducer.clone(),
            lock: self.lock,
        }
    }
}

impl<S, D> fmt::Debug for ActionDefinition<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("reducer", &self.reducer.is_some())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

/// Ordered table of action definitions.
///
/// # Example
///
/// ```
/// use composable_resource_core::action::{ActionDefinition, ResourceSpec};
/// use serde_json::Value;
///
/// let spec = ResourceSpec::<Value, Value>::new()
///     .action("set", ActionDefinition::sync(|_: &Value, args| Ok(args.get::<Value>(0)?)))
///     .action("save", ActionDefinition::sync(|s: &Value, _| Ok(s.clone())).locked());
///
/// assert_eq!(spec.names().collect::<Vec<_>>(), vec!["set", "save"]);
/// assert!(spec.validate().is_ok());
/// ```
pub struct ResourceSpec<S, D> {
    actions: Vec<(String, ActionDefinition<S, D>)>,
}

impl<S, D> ResourceSpec<S, D> {
    /// Empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Add an action. Names are checked by [`validate`](Self::validate).
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, definition: ActionDefinition<S, D>) -> Self {
        self.actions.push((name.into(), definition));
        self
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionDefinition<S, D>> {
        self.actions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    /// Check every name.
    ///
    /// # Errors
    ///
    /// [`ResourceError::EmptyActionName`], [`ResourceError::ReservedName`] or
    /// [`ResourceError::DuplicateAction`] for the first offending name.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let mut seen = HashSet::new();
        for (name, _) in &self.actions {
            if name.is_empty() {
                return Err(ResourceError::EmptyActionName);
            }
            if is_reserved(name) {
                return Err(ResourceError::ReservedName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ResourceError::DuplicateAction(name.clone()));
            }
        }
        Ok(())
    }

    /// Consume into `(name, definition)` pairs in registration order.
    #[must_use]
    pub fn into_actions(self) -> Vec<(String, ActionDefinition<S, D>)> {
        self.actions
    }
}

impl<S, D> Default for ResourceSpec<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> fmt::Debug for ResourceSpec<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.actions.iter().map(|(n, d)| (n, d)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn noop() -> ActionDefinition<Value, Value> {
        ActionDefinition::sync(|s: &Value, _| Ok(s.clone()))
    }

    #[test]
    fn every_reserved_name_is_rejected() {
        for name in RESERVED_ACTION_NAMES {
            let spec = ResourceSpec::new().action(name, noop());
            assert!(
                matches!(spec.validate(), Err(ResourceError::ReservedName(n)) if n == name),
                "{name} should be reserved"
            );
        }
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!(is_reserved("getValue"));
        assert!(!is_reserved("getvalue"));
        let spec = ResourceSpec::new().action("Subscribe", noop());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let dup = ResourceSpec::new().action("add", noop()).action("add", noop());
        assert!(matches!(dup.validate(), Err(ResourceError::DuplicateAction(n)) if n == "add"));

        let empty = ResourceSpec::new().action("", noop());
        assert!(matches!(empty.validate(), Err(ResourceError::EmptyActionName)));
    }

    #[test]
    fn definition_flags() {
        let def = noop().locked().with_reducer(|_, d| d);
        assert!(def.is_locked());
        assert!(def.reducer().is_some());

        let spec = ResourceSpec::new().action("save", def);
        assert!(spec.get("save").is_some_and(ActionDefinition::is_locked));
        assert!(spec.get("load").is_none());
    }

    #[test]
    fn epic_receives_state_and_args() {
        let def = ActionDefinition::<Value, Value>::new(|s, args| {
            Epic::value(json!([s.clone(), args.value(0).cloned()]))
        });
        let out = (def.epic())(&json!(1), crate::args![2]);
        assert!(matches!(out, Epic::Ready(Ok(v)) if v == json!([1, 2])));
    }
}
