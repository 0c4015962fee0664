//! The single ordered path from "epic completed" to "state published".
//!
//! Epics run concurrently and finish in any order. Each completion enters
//! [`EventSerializer::complete`], which holds a FIFO async lock while it:
//!
//! 1. snapshots the current state and runs the middleware chain
//! 2. numbers the event and applies the reducer
//! 3. writes the new state to persistence, if configured
//! 4. publishes the state and broadcasts the event
//!
//! Any failure in steps 1 to 3 leaves the published state untouched.

use composable_resource_core::broadcast::Broadcaster;
use composable_resource_core::epic::Args;
use composable_resource_core::error::ResourceError;
use composable_resource_core::event::ActionEvent;
use composable_resource_core::middleware::{MiddlewareChain, Snapshot};
use composable_resource_core::persistence::PersistenceError;
use composable_resource_core::reducer::{Merge, ReducerPipeline};
use crate::metrics::ResourceMetrics;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, broadcast};

/// Durable write of a freshly reduced state, given the action that produced it.
pub type StateSink<S> =
    Arc<dyn Fn(&str, S) -> BoxFuture<'static, Result<(), PersistenceError>> + Send + Sync>;

/// Serializes completed actions into state transitions.
pub struct EventSerializer<S, D> {
    state: Broadcaster<S>,
    reducers: ReducerPipeline<S, D>,
    middleware: MiddlewareChain<S, D>,
    sink: Option<StateSink<S>>,
    sequence: Mutex<u64>,
    events: broadcast::Sender<ActionEvent<D>>,
}

impl<S, D> EventSerializer<S, D>
where
    S: Merge<D> + Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    /// Create a serializer publishing into `state`.
    ///
    /// `event_capacity` bounds how far an event observer may lag before it
    /// starts skipping events; it is raised to 1 if zero.
    #[must_use]
    pub fn new(
        state: Broadcaster<S>,
        reducers: ReducerPipeline<S, D>,
        middleware: MiddlewareChain<S, D>,
        sink: Option<StateSink<S>>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state,
            reducers,
            middleware,
            sink,
            sequence: Mutex::new(0),
            events,
        }
    }

    /// Fold one completed epic into the state.
    ///
    /// Returns the post-middleware value, which is also the event data the
    /// reducer received.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Middleware`] if a middleware stage fails,
    /// [`ResourceError::Persistence`] if the state could not be written.
    pub async fn complete(&self, action: &str, args: Args, data: D) -> Result<D, ResourceError> {
        let mut sequence = self.sequence.lock().await;
        let current = self.state.value();

        let snapshot = self.middleware.run(Snapshot {
            val: data,
            action: action.to_string(),
            args,
            state: current.clone(),
        })?;

        let event = ActionEvent::new(*sequence + 1, action, snapshot.val);

        let start = Instant::now();
        let next = self.reducers.apply(&current, &event);
        let reduce = start.elapsed();

        if let Some(sink) = &self.sink {
            sink(event.action(), next.clone()).await?;
            tracing::trace!(sequence = event.sequence(), "State persisted");
        }

        *sequence = event.sequence();
        self.state.publish(next);
        ResourceMetrics::record_event(reduce);
        tracing::debug!(action, sequence = event.sequence(), "State published");

        // No receivers is the common case and not an error.
        let _ = self.events.send(event.clone());

        Ok(event.into_data())
    }

    /// Receive every event applied from now on.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ActionEvent<D>> {
        self.events.subscribe()
    }

    /// Number of events applied so far.
    pub async fn sequence(&self) -> u64 {
        *self.sequence.lock().await
    }

    /// Broadcaster holding the current state.
    #[must_use]
    pub const fn state(&self) -> &Broadcaster<S> {
        &self.state
    }
}

impl<S, D> std::fmt::Debug for EventSerializer<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSerializer")
            .field("reducers", &self.reducers)
            .field("middleware", &self.middleware)
            .field("persistent", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
