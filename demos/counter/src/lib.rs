//! # Counter Example
//!
//! A simple counter demonstrating the Composable Resource architecture.
//!
//! This example showcases:
//! - A typed state with its own merge rules
//! - Synchronous, asynchronous and lock-flagged actions
//! - Middleware that clamps every result
//! - Persistence through any [`PersistenceAdapter`]
//!
//! ## Actions
//!
//! | Action  | Args      | Effect                                   |
//! |---------|-----------|------------------------------------------|
//! | `add`   | `[n]`     | `count += n`                             |
//! | `reset` | `[]`      | `count = 0`                              |
//! | `save`  | `[]`      | locked; stamps `saves += 1` after a delay |
//!
//! ## Example
//!
//! ```
//! use composable_resource_core::args;
//! use counter::{CounterState, counter};
//!
//! # tokio_test::block_on(async {
//! let counter = counter(CounterState::default()).unwrap();
//!
//! counter.dispatch("add", args![5]).await.unwrap();
//! counter.dispatch("add", args![-2]).await.unwrap();
//! assert_eq!(counter.state().count, 3);
//! # });
//! ```

use composable_resource_core::persistence::PersistenceAdapter;
use composable_resource_core::{
    ActionDefinition, Merge, MergePolicy, MiddlewareChain, ResourceError, ResourceSpec, Snapshot,
};
use composable_resource_runtime::{Resource, ResourceConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Storage key used by [`persistent_counter`].
pub const STORAGE_KEY: &str = "counter";

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// How many times `save` completed
    #[serde(default)]
    pub saves: u32,
}

/// Partial update produced by the counter's epics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPatch {
    /// New count, if changed
    pub count: Option<i64>,
    /// New save count, if changed
    pub saves: Option<u32>,
}

impl Merge<CounterPatch> for CounterState {
    fn replace(&self, data: CounterPatch) -> Self {
        Self {
            count: data.count.unwrap_or_default(),
            saves: data.saves.unwrap_or_default(),
        }
    }

    fn merge(&self, data: CounterPatch) -> Self {
        Self {
            count: data.count.unwrap_or(self.count),
            saves: data.saves.unwrap_or(self.saves),
        }
    }
}

/// The counter's action table.
#[must_use]
pub fn counter_spec(save_delay: Duration) -> ResourceSpec<CounterState, CounterPatch> {
    ResourceSpec::new()
        .action(
            "add",
            ActionDefinition::sync(|state: &CounterState, args| {
                let n: i64 = args.get(0)?;
                Ok(CounterPatch {
                    count: Some(state.count.saturating_add(n)),
                    saves: None,
                })
            }),
        )
        .action(
            "reset",
            ActionDefinition::sync(|_: &CounterState, _| {
                Ok(CounterPatch {
                    count: Some(0),
                    saves: None,
                })
            }),
        )
        .action(
            "save",
            ActionDefinition::future(move |state: CounterState, _| async move {
                tokio::time::sleep(save_delay).await;
                tracing::info!(count = state.count, "Counter saved");
                Ok(CounterPatch {
                    count: None,
                    saves: Some(state.saves + 1),
                })
            })
            .locked(),
        )
}

/// Middleware keeping `count` within `min..=max`.
#[must_use]
pub fn clamp(min: i64, max: i64) -> MiddlewareChain<CounterState, CounterPatch> {
    MiddlewareChain::new().with(move |snap: &Snapshot<CounterState, CounterPatch>| {
        Ok(CounterPatch {
            count: snap.val.count.map(|c| c.clamp(min, max)),
            ..snap.val.clone()
        })
    })
}

fn config() -> ResourceConfig<CounterState, CounterPatch> {
    ResourceConfig::default().with_merge_policy(MergePolicy::Merge)
}

/// In-memory counter.
///
/// # Errors
///
/// Never fails for this action table; the error type is the resource's
/// construction error.
pub fn counter(initial: CounterState) -> Result<Resource<CounterState, CounterPatch>, ResourceError> {
    Resource::with_config(initial, counter_spec(Duration::from_millis(20)), config())
}

/// Counter whose results are clamped to `min..=max`.
///
/// # Errors
///
/// Never fails for this action table.
pub fn clamped_counter(
    initial: CounterState,
    min: i64,
    max: i64,
) -> Result<Resource<CounterState, CounterPatch>, ResourceError> {
    Resource::with_config(
        initial,
        counter_spec(Duration::from_millis(20)),
        config().with_middleware(clamp(min, max)),
    )
}

/// Counter stored under [`STORAGE_KEY`].
///
/// # Errors
///
/// [`ResourceError::Persistence`] if the stored counter cannot be read.
pub async fn persistent_counter<A>(adapter: Arc<A>) -> Result<Resource<CounterState, CounterPatch>, ResourceError>
where
    A: PersistenceAdapter + ?Sized + 'static,
{
    Resource::persistent(
        adapter,
        STORAGE_KEY,
        CounterState::default(),
        counter_spec(Duration::from_millis(20)),
        config(),
    )
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use composable_resource_core::reducer::ReducerPipeline;
    use composable_resource_testing::ReducerTest;
    use proptest::prelude::*;

    fn patch(count: i64) -> CounterPatch {
        CounterPatch {
            count: Some(count),
            saves: None,
        }
    }

    #[test]
    fn test_patch_merge_keeps_saves() {
        ReducerTest::new(ReducerPipeline::new(MergePolicy::Merge))
            .given_state(CounterState { count: 1, saves: 2 })
            .when_event("add", patch(4))
            .then_state(|state: &CounterState| {
                assert_eq!(state, &CounterState { count: 4, saves: 2 });
            })
            .run();
    }

    #[test]
    fn test_patch_replace_drops_saves() {
        ReducerTest::new(ReducerPipeline::new(MergePolicy::Replace))
            .given_state(CounterState { count: 1, saves: 2 })
            .when_event("add", patch(4))
            .then_state(|state: &CounterState| {
                assert_eq!(state, &CounterState { count: 4, saves: 0 });
            })
            .run();
    }

    #[test]
    fn test_clamp_middleware() {
        let snapshot = Snapshot {
            val: patch(250),
            action: "add".into(),
            args: composable_resource_core::args![240],
            state: CounterState { count: 10, saves: 0 },
        };
        let out = clamp(0, 100).run(snapshot).unwrap();
        assert_eq!(out.val.count, Some(100));
    }

    proptest! {
        #[test]
        fn test_clamp_always_in_range(count in any::<i64>(), min in -100_i64..0, max in 0_i64..100) {
            let snapshot = Snapshot {
                val: patch(count),
                action: "add".into(),
                args: composable_resource_core::Args::new(),
                state: CounterState::default(),
            };
            let out = clamp(min, max).run(snapshot).unwrap();
            let clamped = out.val.count.unwrap();
            prop_assert!(min <= clamped && clamped <= max);
        }
    }
}
