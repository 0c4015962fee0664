//! # Composable Resource Core
//!
//! Core types for the Composable Resource architecture.
//!
//! A *resource* is a reactive state container: it publishes a stream of
//! state values and exposes a fixed table of named actions. Calling an action
//! runs its *epic* (which may complete immediately, as a future, or as the
//! first item of a stream), passes the result through a middleware chain, and
//! folds it into the state with a reducer.
//!
//! This crate holds the pure, runtime-independent pieces:
//!
//! - [`broadcast`]: latest-value broadcaster behind every state and lock stream
//! - [`event`]: the completed-action record fed to reducers
//! - [`reducer`]: the [`Merge`](reducer::Merge) trait, merge policies and the reducer pipeline
//! - [`middleware`]: snapshots and the ordered middleware chain
//! - [`epic`]: epic shapes, normalization and call arguments
//! - [`action`]: action definitions, the resource spec table, reserved names
//! - [`persistence`]: backend and adapter contracts plus an in-memory backend
//! - [`error`]: [`ResourceError`](error::ResourceError)
//!
//! The runtime that wires these together lives in `composable-resource-runtime`.
//!
//! ## Example
//!
//! ```
//! use composable_resource_core::action::{ActionDefinition, ResourceSpec};
//! use serde_json::{Value, json};
//!
//! let spec = ResourceSpec::<Value, Value>::new().action(
//!     "add",
//!     ActionDefinition::sync(|s: &Value, args| {
//!         let n: i64 = args.get(0)?;
//!         Ok(json!({"count": s["count"].as_i64().unwrap_or(0) + n}))
//!     }),
//! );
//! assert!(spec.validate().is_ok());
//! ```

pub mod action;
pub mod broadcast;
pub mod epic;
pub mod error;
pub mod event;
pub mod middleware;
pub mod persistence;
pub mod reducer;

// Used by the `args!` macro.
#[doc(hidden)]
pub use serde_json;

pub use action::{ActionDefinition, RESERVED_ACTION_NAMES, ResourceSpec};
pub use broadcast::{Broadcaster, Subscription};
pub use epic::{Args, Epic};
pub use error::ResourceError;
pub use event::ActionEvent;
pub use middleware::{MiddlewareChain, Snapshot};
pub use reducer::{Merge, MergePolicy};
