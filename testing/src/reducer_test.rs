//! Ergonomic testing utilities for reducer pipelines
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use crate::mocks::test_clock;
use composable_resource_core::event::ActionEvent;
use composable_resource_core::reducer::{Merge, ReducerPipeline};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for event assertion functions
type EventAssertion<D> = Box<dyn FnOnce(&[ActionEvent<D>])>;

/// Fluent API for testing reducer pipelines with Given-When-Then syntax
///
/// Events are numbered from 1 and stamped with [`test_clock`], exactly as
/// the runtime would number them.
///
/// # Example
///
/// ```
/// use composable_resource_core::{MergePolicy, reducer::ReducerPipeline};
/// use composable_resource_testing::ReducerTest;
/// use serde_json::json;
///
/// ReducerTest::new(ReducerPipeline::new(MergePolicy::Merge))
///     .given_state(json!({"count": 0, "name": "x"}))
///     .when_event("add", json!({"count": 5}))
///     .then_state(|state| {
///         assert_eq!(state, &json!({"count": 5, "name": "x"}));
///     })
///     .run();
/// ```
pub struct ReducerTest<S, D> {
    pipeline: ReducerPipeline<S, D>,
    initial_state: Option<S>,
    events: Vec<ActionEvent<D>>,
    state_assertions: Vec<StateAssertion<S>>,
    event_assertions: Vec<EventAssertion<D>>,
}

impl<S, D> ReducerTest<S, D>
where
    S: Merge<D> + Clone,
    D: Clone,
{
    /// Create a new reducer test with the given pipeline
    #[must_use]
    pub const fn new(pipeline: ReducerPipeline<S, D>) -> Self {
        Self {
            pipeline,
            initial_state: None,
            events: Vec::new(),
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add a completed action to apply (When). May be called repeatedly.
    #[must_use]
    pub fn when_event(mut self, action: &str, data: D) -> Self {
        let sequence = self.events.len() as u64 + 1;
        self.events
            .push(ActionEvent::at(sequence, action, data, test_clock()));
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the applied events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[ActionEvent<D>]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the initial state or any event is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let initial = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        assert!(
            !self.events.is_empty(),
            "At least one event must be set with when_event()"
        );

        let state = self
            .events
            .iter()
            .fold(initial, |state, event| self.pipeline.apply(&state, event));

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.event_assertions {
            assertion(&self.events);
        }
    }
}

/// Helper assertions for dispatch results and events
pub mod assertions {
    use composable_resource_core::error::ResourceError;
    use composable_resource_core::event::ActionEvent;
    use std::fmt::Debug;

    /// Assert that a dispatch was rejected by the resource lock
    ///
    /// # Panics
    ///
    /// Panics if the result is not [`ResourceError::Locked`].
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_locked<D: Debug>(result: &Result<D, ResourceError>) {
        assert!(
            matches!(result, Err(ResourceError::Locked { .. })),
            "Expected a locked rejection, but got {result:?}"
        );
    }

    /// Assert that a dispatch failed in its epic with the given message
    ///
    /// # Panics
    ///
    /// Panics if the result is not an epic failure or the message differs.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_epic_error<D: Debug>(result: &Result<D, ResourceError>, message: &str) {
        match result {
            Err(ResourceError::Epic(e)) => assert_eq!(
                e.to_string(),
                message,
                "Epic failed with an unexpected error"
            ),
            other => panic!("Expected an epic failure, but got {other:?}"),
        }
    }

    /// Assert that events are numbered 1, 2, 3, ... without gaps
    ///
    /// # Panics
    ///
    /// Panics on the first out-of-order sequence number.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_sequential<D>(events: &[ActionEvent<D>]) {
        for (index, event) in events.iter().enumerate() {
            assert_eq!(
                event.sequence(),
                index as u64 + 1,
                "Event for \"{}\" is out of sequence",
                event.action()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_resource_core::error::ResourceError;
    use composable_resource_core::reducer::MergePolicy;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn add_pipeline() -> ReducerPipeline<Value, Value> {
        ReducerPipeline::new(MergePolicy::Replace).with_reducer(
            "add",
            Arc::new(|state: &Value, delta: Value| {
                json!(state.as_i64().unwrap_or(0) + delta.as_i64().unwrap_or(0))
            }),
        )
    }

    #[test]
    fn test_reducer_test_applies_events_in_order() {
        ReducerTest::new(add_pipeline())
            .given_state(json!(0))
            .when_event("add", json!(5))
            .when_event("add", json!(-2))
            .then_state(|state| {
                assert_eq!(state, &json!(3));
            })
            .then_events(|events| {
                assertions::assert_sequential(events);
                assert_eq!(events.len(), 2);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_default_policy() {
        ReducerTest::new(add_pipeline())
            .given_state(json!(7))
            .when_event("set", json!(1))
            .then_state(|state| {
                assert_eq!(state, &json!(1));
            })
            .run();
    }

    #[test]
    fn test_assertions_locked() {
        let result: Result<Value, _> = Err(ResourceError::Locked {
            action: "save".into(),
        });
        assertions::assert_locked(&result);
    }

    #[test]
    fn test_assertions_epic_error() {
        let result: Result<Value, _> = Err(ResourceError::Epic(anyhow::anyhow!("offline")));
        assertions::assert_epic_error(&result, "offline");
    }
}
