//! Latest-value broadcasting.
//!
//! A [`Broadcaster`] holds exactly one current value and a list of subscriber
//! callbacks. Subscribing delivers the current value immediately; publishing
//! replaces the value and notifies every subscriber synchronously, in
//! registration order.
//!
//! Nothing older than the current value is ever replayed: a subscriber that
//! joins after three publishes sees only the third value.
//!
//! # Example
//!
//! ```
//! use composable_resource_core::broadcast::Broadcaster;
//! use std::sync::{Arc, Mutex};
//!
//! let counter = Broadcaster::new(0);
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = Arc::clone(&seen);
//! let subscription = counter.subscribe(move |v: &i32| sink.lock().unwrap().push(*v));
//!
//! counter.publish(1);
//! subscription.unsubscribe();
//! counter.publish(2);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
//! assert_eq!(counter.value(), 2);
//! ```
//!
//! # Re-entrancy
//!
//! Callbacks may call [`Broadcaster::value`] and [`Subscription::unsubscribe`]
//! on the broadcaster that is notifying them. They must not call
//! [`Broadcaster::publish`] or [`Broadcaster::subscribe`] on it synchronously;
//! emissions are serialized and doing so would wait on itself.

use futures::Stream;
use futures::channel::mpsc;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lock a mutex, recovering the guard if a subscriber panicked while holding it.
///
/// The guarded data is a plain value plus a subscriber list, both of which
/// stay consistent across a panic in user code.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    /// Serializes emissions so subscribers observe publishes in order.
    emit: Mutex<()>,
}

/// Removes a subscriber by id without knowing the value type.
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send> Detach for Shared<T> {
    fn detach(&self, id: u64) {
        lock(&self.inner).subscribers.retain(|(sid, _)| *sid != id);
    }
}

/// A multicast value holder that always hands its latest value to new subscribers.
///
/// Cloning a `Broadcaster` yields another handle to the same value and
/// subscriber set.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Create a broadcaster holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    value,
                    subscribers: Vec::new(),
                    next_id: 0,
                }),
                emit: Mutex::new(()),
            }),
        }
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> T {
        lock(&self.shared.inner).value.clone()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.inner).subscribers.len()
    }

    /// Register `callback` and invoke it with the current value before returning.
    ///
    /// The returned [`Subscription`] removes the callback when
    /// [`Subscription::unsubscribe`] is called. Dropping the handle leaves the
    /// callback registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let _emit = lock(&self.shared.emit);
        let callback: Callback<T> = Arc::new(callback);

        let (id, current) = {
            let mut inner = lock(&self.shared.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::clone(&callback)));
            (id, inner.value.clone())
        };

        callback(&current);

        let target: Weak<dyn Detach> = Arc::downgrade(&self.shared) as Weak<dyn Detach>;
        Subscription {
            id,
            target,
            active: AtomicBool::new(true),
        }
    }

    /// Replace the current value and notify every subscriber.
    pub fn publish(&self, value: T) {
        let _emit = lock(&self.shared.emit);
        self.emit_locked(value);
    }

    /// Publish `value` only if the current value equals `expected`.
    ///
    /// Check and publish happen under the emission lock, so two racing callers
    /// cannot both succeed for the same `expected`.
    pub fn compare_and_publish(&self, expected: &T, value: T) -> bool
    where
        T: PartialEq,
    {
        let _emit = lock(&self.shared.emit);
        if lock(&self.shared.inner).value != *expected {
            return false;
        }
        self.emit_locked(value);
        true
    }

    /// Subscribe as an async [`Stream`].
    ///
    /// The stream yields the current value first, then every later publish.
    /// Dropping the stream unsubscribes.
    #[must_use]
    pub fn stream(&self) -> BroadcastStream<T> {
        let (tx, rx) = mpsc::unbounded();
        let subscription = self.subscribe(move |value: &T| {
            // Receiver gone means the stream was dropped; its Drop unsubscribes.
            let _ = tx.unbounded_send(value.clone());
        });
        BroadcastStream {
            receiver: rx,
            subscription,
        }
    }

    fn emit_locked(&self, value: T) {
        let subscribers: Vec<(u64, Callback<T>)> = {
            let mut inner = lock(&self.shared.inner);
            inner.value = value.clone();
            inner
                .subscribers
                .iter()
                .map(|(id, cb)| (*id, Arc::clone(cb)))
                .collect()
        };

        for (id, callback) in subscribers {
            // A callback earlier in this round may have unsubscribed this one.
            let registered = lock(&self.shared.inner)
                .subscribers
                .iter()
                .any(|(sid, _)| *sid == id);
            if registered {
                callback(&value);
            }
        }
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.shared.inner);
        f.debug_struct("Broadcaster")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

/// Handle returned by [`Broadcaster::subscribe`].
#[must_use = "dropping the handle does not unsubscribe; keep it to call unsubscribe()"]
pub struct Subscription {
    id: u64,
    target: Weak<dyn Detach>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the callback from its broadcaster. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(target) = self.target.upgrade() {
                target.detach(self.id);
            }
        }
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Stream view of a [`Broadcaster`], created by [`Broadcaster::stream`].
pub struct BroadcastStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    subscription: Subscription,
}

impl<T> Stream for BroadcastStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl<T> Drop for BroadcastStream<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl<T> fmt::Debug for BroadcastStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastStream")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &T| sink.lock().unwrap().push(v.clone()))
    }

    #[test]
    fn subscribe_delivers_current_value_immediately() {
        let b = Broadcaster::new("seed".to_string());
        b.publish("latest".to_string());

        let (seen, cb) = recorder();
        let _sub = b.subscribe(cb);

        assert_eq!(*seen.lock().unwrap(), vec!["latest".to_string()]);
    }

    #[test]
    fn publish_notifies_in_registration_order() {
        let b = Broadcaster::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            let _ = b.subscribe(move |v: &i32| order.lock().unwrap().push((tag, *v)));
        }
        order.lock().unwrap().clear();

        b.publish(7);
        assert_eq!(*order.lock().unwrap(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let b = Broadcaster::new(1);
        let (seen, cb) = recorder();
        let sub = b.subscribe(cb);

        sub.unsubscribe();
        sub.unsubscribe();
        b.publish(2);

        assert!(!sub.is_active());
        assert_eq!(b.subscriber_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn dropping_subscription_keeps_callback() {
        let b = Broadcaster::new(1);
        let (seen, cb) = recorder();
        drop(b.subscribe(cb));

        b.publish(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn callback_can_read_value_and_unsubscribe_itself() {
        let b = Broadcaster::new(0);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let reads = Arc::new(Mutex::new(Vec::new()));

        let (handle, slot_cb, reads_cb) = (b.clone(), Arc::clone(&slot), Arc::clone(&reads));
        let sub = b.subscribe(move |v: &i32| {
            reads_cb.lock().unwrap().push(handle.value());
            if *v >= 1 {
                if let Some(s) = slot_cb.lock().unwrap().as_ref() {
                    s.unsubscribe();
                }
            }
        });
        *slot.lock().unwrap() = Some(sub);

        b.publish(1);
        b.publish(2);

        assert_eq!(*reads.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn compare_and_publish_only_swaps_on_match() {
        let b = Broadcaster::new(false);
        assert!(b.compare_and_publish(&false, true));
        assert!(!b.compare_and_publish(&false, true));
        assert!(b.value());
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        let b = Broadcaster::new(10);
        let mut stream = b.stream();

        assert_eq!(stream.next().await, Some(10));
        b.publish(11);
        assert_eq!(stream.next().await, Some(11));

        drop(stream);
        assert_eq!(b.subscriber_count(), 0);
    }
}
