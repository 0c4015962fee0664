//! Middleware: ordered transforms applied to an epic's result before it is reduced.
//!
//! Every stage sees the whole [`Snapshot`] (the current `val` plus the
//! action name, its arguments and the state the result will be merged into)
//! and returns the next `val`. The reducer receives the `val` of the last stage.

use crate::epic::Args;
use crate::error::ResourceError;
use std::fmt;
use std::sync::Arc;

/// Record carried through a [`MiddlewareChain`].
///
/// Only `val` changes from stage to stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S, D> {
    /// Value produced by the epic, as transformed so far
    pub val: D,
    /// Action being completed
    pub action: String,
    /// Arguments of the call
    pub args: Args,
    /// State the result will be reduced into
    pub state: S,
}

/// One middleware stage.
pub type Middleware<S, D> = Arc<dyn Fn(&Snapshot<S, D>) -> anyhow::Result<D> + Send + Sync>;

/// Ordered list of middleware stages.
///
/// # Example
///
/// ```
/// use composable_resource_core::args;
/// use composable_resource_core::middleware::{MiddlewareChain, Snapshot};
///
/// let chain = MiddlewareChain::<(), i64>::new()
///     .with(|s| Ok(s.val + 1))
///     .with(|s| Ok(s.val * 2));
///
/// let out = chain
///     .run(Snapshot { val: 1, action: "x".into(), args: args![], state: () })
///     .unwrap();
/// assert_eq!(out.val, 4);
/// ```
pub struct MiddlewareChain<S, D> {
    stages: Vec<Middleware<S, D>>,
}

impl<S, D> MiddlewareChain<S, D> {
    /// Empty chain; running it returns the snapshot unchanged.
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    #[must_use]
    pub fn with<F>(mut self, stage: F) -> Self
    where
        F: Fn(&Snapshot<S, D>) -> anyhow::Result<D> + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage.
    pub fn push(&mut self, stage: Middleware<S, D>) {
        self.stages.push(stage);
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Middleware`] naming the first stage that failed.
    /// Later stages do not run.
    pub fn run(&self, snapshot: Snapshot<S, D>) -> Result<Snapshot<S, D>, ResourceError> {
        self.stages
            .iter()
            .enumerate()
            .try_fold(snapshot, |mut acc, (stage, f)| match f(&acc) {
                Ok(val) => {
                    acc.val = val;
                    Ok(acc)
                }
                Err(source) => Err(ResourceError::Middleware {
                    action: acc.action,
                    stage,
                    source,
                }),
            })
    }
}

impl<S, D> Default for MiddlewareChain<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> Clone for MiddlewareChain<S, D> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<S, D> fmt::Debug for MiddlewareChain<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::args;
    use serde_json::{Value, json};

    fn snapshot(val: i64) -> Snapshot<Value, i64> {
        Snapshot {
            val,
            action: "x".into(),
            args: args![],
            state: json!({}),
        }
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = MiddlewareChain::new();
        assert_eq!(chain.run(snapshot(9)).unwrap(), snapshot(9));
    }

    #[test]
    fn stages_apply_left_to_right() {
        let chain = MiddlewareChain::new()
            .with(|s: &Snapshot<Value, i64>| Ok(s.val + 1))
            .with(|s: &Snapshot<Value, i64>| Ok(s.val * 2));

        let out = chain.run(snapshot(1)).unwrap();
        assert_eq!(out.val, 4);
        assert_eq!(out.action, "x");
    }

    #[test]
    fn stages_can_inspect_action_args_and_state() {
        let chain = MiddlewareChain::new().with(|s: &Snapshot<Value, i64>| {
            let factor = s.args.get::<i64>(0)?;
            let base = s.state["base"].as_i64().unwrap_or(0);
            Ok(s.val * factor + base + i64::from(s.action == "scale"))
        });

        let out = chain
            .run(Snapshot {
                val: 3,
                action: "scale".into(),
                args: args![10],
                state: json!({"base": 100}),
            })
            .unwrap();
        assert_eq!(out.val, 131);
    }

    #[test]
    fn failing_stage_stops_the_chain() {
        let chain = MiddlewareChain::new()
            .with(|_: &Snapshot<Value, i64>| Err(anyhow::anyhow!("rejected")))
            .with(|_: &Snapshot<Value, i64>| -> anyhow::Result<i64> { unreachable!() });

        let err = chain.run(snapshot(1)).unwrap_err();
        assert!(matches!(err, ResourceError::Middleware { stage: 0, .. }));
    }
}
