//! Cancellable, bounded-wait signaling primitive.
//!
//! Grounded on `src/context.rs` in the teacher repo: a condvar guarding a
//! single boolean, cloneable via `Arc` so every actor that needs to observe
//! "has shutdown been requested" can hold a cheap handle to the same flag.
//! Generalized here to carry an arbitrary payload `T` (e.g. a shutdown
//! deadline) instead of only `bool`, per SPEC_FULL.md §5.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared, cancellable state of type `T` plus a condvar to wake waiters.
#[derive(Clone)]
pub struct Context<T>(Arc<(Mutex<T>, Condvar)>);

impl<T: Clone + PartialEq> Context<T> {
    pub fn new(initial: T) -> Self {
        Context(Arc::new((Mutex::new(initial), Condvar::new())))
    }

    /// Replace the held value and wake every waiter.
    pub fn set(&self, value: T) {
        let (lock, cvar) = &*self.0;
        let mut guard = lock.lock().expect("context mutex poisoned");
        *guard = value;
        cvar.notify_all();
    }

    pub fn get(&self) -> T {
        let (lock, _) = &*self.0;
        lock.lock().expect("context mutex poisoned").clone()
    }

    /// Block until the held value equals `target`, or `timeout` elapses.
    /// Returns `true` if the value was reached, `false` on timeout.
    pub fn wait_for(&self, target: T, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.0;
        let guard = lock.lock().expect("context mutex poisoned");
        let (guard, result) = cvar
            .wait_timeout_while(guard, timeout, |v| *v != target)
            .expect("context mutex poisoned");
        !result.timed_out() || *guard == target
    }

    /// Block until the held value equals `target`, with no deadline.
    pub fn wait_forever(&self, target: T) {
        let (lock, cvar) = &*self.0;
        let guard = lock.lock().expect("context mutex poisoned");
        let _ = cvar
            .wait_while(guard, |v| *v != target)
            .expect("context mutex poisoned");
    }
}

impl<T: Clone + PartialEq + Default> Default for Context<T> {
    fn default() -> Self {
        Context::new(T::default())
    }
}

/// Alias used by actors whose only concern is a single cancellation flag.
pub type CancelContext = Context<bool>;
