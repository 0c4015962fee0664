//! Resource-wide cooperative lock.
//!
//! One [`LockGate`] exists per resource and is shared by all of its
//! lock-flagged actions. Actions without the flag never look at it.
//!
//! Acquisition either succeeds immediately or fails immediately with
//! [`ResourceError::Locked`]; callers are never left waiting. The returned
//! [`LockGuard`] releases the gate when dropped, so release happens whether
//! the epic succeeds, fails, panics, or the dispatch future is dropped.

use composable_resource_core::broadcast::{BroadcastStream, Broadcaster, Subscription};
use composable_resource_core::error::ResourceError;

/// Lock flag plus the broadcaster announcing its changes.
#[derive(Clone, Debug)]
pub struct LockGate {
    flag: Broadcaster<bool>,
}

impl LockGate {
    /// Unlocked gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Broadcaster::new(false),
        }
    }

    /// Take the gate for `action`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Locked`] if another action holds the gate.
    pub fn try_acquire(&self, action: &str) -> Result<LockGuard, ResourceError> {
        if self.flag.compare_and_publish(&false, true) {
            tracing::debug!(action, "Resource lock acquired");
            Ok(LockGuard {
                gate: self.clone(),
                action: action.to_string(),
            })
        } else {
            tracing::warn!(action, "Rejected action: resource is locked");
            Err(ResourceError::Locked {
                action: action.to_string(),
            })
        }
    }

    /// Whether the gate is held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.flag.value()
    }

    /// Observe lock changes; the callback sees the current flag immediately.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.flag.subscribe(callback)
    }

    /// Lock changes as a stream.
    #[must_use]
    pub fn stream(&self) -> BroadcastStream<bool> {
        self.flag.stream()
    }

    fn release(&self) {
        self.flag.publish(false);
    }
}

impl Default for LockGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a [`LockGate`]; releases it on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard {
    gate: LockGate,
    action: String,
}

impl LockGuard {
    /// Action holding the lock.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.gate.release();
        tracing::debug!(action = %self.action, "Resource lock released");
    }
}
