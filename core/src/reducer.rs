//! Reducers: folding completed-action events into state.
//!
//! Each action may bring its own reducer. Actions without one fall back to
//! the resource-level [`MergePolicy`]:
//!
//! - [`MergePolicy::Replace`] (the default): the event data becomes the new state
//! - [`MergePolicy::Merge`]: the event data is shallow-merged into the previous state
//!
//! Both policies are expressed through the [`Merge`] trait, so state types
//! decide what "replace" and "shallow merge" mean for them.

use crate::event::ActionEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A per-action reducer: `(previous state, event data) -> next state`.
pub type ReducerFn<S, D> = Arc<dyn Fn(&S, D) -> S + Send + Sync>;

/// How a state absorbs the data of an action that has no reducer of its own.
///
/// # Example
///
/// ```
/// use composable_resource_core::reducer::Merge;
/// use serde_json::json;
///
/// let state = json!({"count": 0, "name": "x"});
/// assert_eq!(state.replace(json!({"count": 5})), json!({"count": 5}));
/// assert_eq!(state.merge(json!({"count": 5})), json!({"count": 5, "name": "x"}));
/// ```
pub trait Merge<D = Self>: Sized {
    /// Next state when `data` replaces the previous state wholesale.
    fn replace(&self, data: D) -> Self;

    /// Next state when `data` is shallow-combined into the previous state.
    fn merge(&self, data: D) -> Self;
}

impl Merge for Value {
    fn replace(&self, data: Self) -> Self {
        data
    }

    /// Object keys in `data` overwrite keys in `self`. Anything that is not
    /// an object on both sides is replaced.
    fn merge(&self, data: Self) -> Self {
        match (self, data) {
            (Self::Object(current), Self::Object(patch)) => {
                let mut merged = current.clone();
                merged.extend(patch);
                Self::Object(merged)
            }
            (_, data) => data,
        }
    }
}

impl<K, V, H> Merge for HashMap<K, V, H>
where
    K: Eq + Hash + Clone,
    V: Clone,
    H: BuildHasher + Clone,
{
    fn replace(&self, data: Self) -> Self {
        data
    }

    fn merge(&self, data: Self) -> Self {
        let mut merged = self.clone();
        merged.extend(data);
        merged
    }
}

impl<K, V> Merge for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn replace(&self, data: Self) -> Self {
        data
    }

    fn merge(&self, data: Self) -> Self {
        let mut merged = self.clone();
        merged.extend(data);
        merged
    }
}

/// Resource-wide default reducer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Event data replaces the state.
    #[default]
    Replace,
    /// Event data is shallow-merged into the state.
    Merge,
}

impl MergePolicy {
    /// Apply this policy to `state`.
    pub fn apply<S, D>(self, state: &S, data: D) -> S
    where
        S: Merge<D>,
    {
        match self {
            Self::Replace => state.replace(data),
            Self::Merge => state.merge(data),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Combines an event with the prior state into the next state.
///
/// Holds the per-action reducers of a resource plus the default policy used
/// for every action that did not register one.
pub struct ReducerPipeline<S, D> {
    policy: MergePolicy,
    reducers: HashMap<String, ReducerFn<S, D>>,
}

impl<S, D> ReducerPipeline<S, D>
where
    S: Merge<D>,
    D: Clone,
{
    /// Pipeline with no per-action reducers.
    #[must_use]
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            reducers: HashMap::new(),
        }
    }

    /// Register `reducer` for `action`, replacing any earlier one.
    #[must_use]
    pub fn with_reducer(mut self, action: impl Into<String>, reducer: ReducerFn<S, D>) -> Self {
        self.reducers.insert(action.into(), reducer);
        self
    }

    /// Default policy in effect.
    #[must_use]
    pub const fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Whether `action` has its own reducer.
    #[must_use]
    pub fn has_reducer(&self, action: &str) -> bool {
        self.reducers.contains_key(action)
    }

    /// Compute the state that follows `event`.
    ///
    /// The action's own reducer wins; otherwise the default policy applies.
    pub fn apply(&self, state: &S, event: &ActionEvent<D>) -> S {
        let data = event.data().clone();
        match self.reducers.get(event.action()) {
            Some(reducer) => reducer(state, data),
            None => self.policy.apply(state, data),
        }
    }
}

impl<S, D> fmt::Debug for ReducerPipeline<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&String> = self.reducers.keys().collect();
        actions.sort();
        f.debug_struct("ReducerPipeline")
            .field("policy", &self.policy)
            .field("reducers", &actions)
            .finish()
    }
}
