//! Integration tests for Counter with Resource
//!
//! These tests demonstrate the full end-to-end flow of the
//! Composable Resource architecture.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use composable_resource_core::args;
use composable_resource_core::persistence::KeyValueStore;
use composable_resource_testing::{Recorder, RecordingBackend, assertions};
use counter::{CounterState, STORAGE_KEY, clamped_counter, counter, persistent_counter};
use serde_json::json;
use std::sync::Arc;

fn state(count: i64, saves: u32) -> CounterState {
    CounterState { count, saves }
}

#[tokio::test]
async fn test_counter_end_to_end() {
    let counter = counter(CounterState::default()).unwrap();
    let recorder = Recorder::new();
    let _sub = counter.subscribe(recorder.callback());

    counter.dispatch("add", args![5]).await.unwrap();
    counter.dispatch("add", args![-2]).await.unwrap();

    assert_eq!(
        recorder.values(),
        vec![state(0, 0), state(5, 0), state(3, 0)]
    );
}

#[tokio::test]
async fn test_action_handles() {
    let counter = counter(state(7, 0)).unwrap();
    let add = counter.action("add").unwrap();
    let reset = counter.action("reset").unwrap();

    add.call(args![1]).await.unwrap();
    assert_eq!(counter.state().count, 8);

    reset.call(args![]).await.unwrap();
    assert_eq!(counter.state().count, 0);
    assert_eq!(
        counter.actions().collect::<Vec<_>>(),
        vec!["add", "reset", "save"]
    );
}

#[tokio::test]
async fn test_concurrent_save_is_rejected() {
    let counter = counter(state(2, 0)).unwrap();

    let (first, second) = tokio::join!(
        counter.dispatch("save", args![]),
        counter.dispatch("save", args![]),
    );

    assert!(first.is_ok());
    assertions::assert_locked(&second);
    assert_eq!(counter.state(), state(2, 1));
}

#[tokio::test]
async fn test_add_while_saving_is_kept() {
    let counter = counter(state(0, 0)).unwrap();

    let (saved, added) = tokio::join!(counter.dispatch("save", args![]), async {
        counter.dispatch("add", args![4]).await
    });

    saved.unwrap();
    added.unwrap();
    assert_eq!(counter.state(), state(4, 1));
}

#[tokio::test]
async fn test_clamped_counter() {
    let counter = clamped_counter(CounterState::default(), -10, 10).unwrap();

    counter.dispatch("add", args![25]).await.unwrap();
    assert_eq!(counter.state().count, 10);

    counter.dispatch("add", args![-50]).await.unwrap();
    assert_eq!(counter.state().count, -10);
}

#[tokio::test]
async fn test_bad_argument_is_rejected() {
    let counter = counter(CounterState::default()).unwrap();
    let err = counter.dispatch("add", args!["five"]).await.unwrap_err();

    assert!(err.epic_error().is_some());
    assert_eq!(counter.state(), CounterState::default());
}

#[tokio::test]
async fn test_persistent_counter_round_trip() {
    let store = Arc::new(KeyValueStore::new(RecordingBackend::new()));

    let counter = persistent_counter(Arc::clone(&store)).await.unwrap();
    counter.dispatch("add", args![5]).await.unwrap();
    counter.dispatch("add", args![-2]).await.unwrap();

    assert_eq!(
        store.backend().inner().peek(STORAGE_KEY),
        Some(json!({"count": 3, "saves": 0}))
    );
    // Default once, then one write per action
    assert_eq!(store.backend().writes(), 3);

    let restored = persistent_counter(store).await.unwrap();
    assert_eq!(restored.state(), state(3, 0));
}
