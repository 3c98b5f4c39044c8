//! One-shot completion signal.
//!
//! Resolved at most once. Later attempts are no-ops, every waiter is released
//! together, and done-callbacks run exactly once in registration order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

type Callback<T> = Box<dyn FnOnce(&T) + Send>;

/// Cloneable handle to a single-resolution signal carrying a `T`.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    resolved: Notify,
}

struct State<T> {
    value: Option<T>,
    callbacks: Vec<Callback<T>>,
}

impl<T: Clone> Completion<T> {
    /// Create an unresolved signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: None,
                    callbacks: Vec::new(),
                }),
                resolved: Notify::new(),
            }),
        }
    }

    /// Resolve the signal.
    ///
    /// Returns `true` if this call resolved it, `false` if it was already
    /// resolved (in which case `value` is discarded).
    pub fn set(&self, value: T) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value.clone());
            std::mem::take(&mut state.callbacks)
        };

        self.inner.resolved.notify_waiters();
        for callback in callbacks {
            callback(&value);
        }
        true
    }

    /// Whether the signal has been resolved.
    pub fn is_set(&self) -> bool {
        self.lock().value.is_some()
    }

    /// The resolved value, if any.
    pub fn get(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Wait until the signal is resolved and return its value.
    pub async fn wait(&self) -> T {
        loop {
            let notified = self.inner.resolved.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.get() {
                return value;
            }
            notified.await;
        }
    }

    /// Run `callback` once the signal resolves, or now if it already has.
    pub fn on_done<F>(&self, callback: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut state = self.lock();
        match state.value.clone() {
            Some(value) => {
                drop(state);
                callback(&value);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready_eq};

    #[test]
    fn test_set_only_once() {
        let done = Completion::new();
        assert!(!done.is_set());
        assert!(done.set(1));
        assert!(!done.set(2));
        assert_eq!(done.get(), Some(1));
    }

    #[test]
    fn test_all_waiters_released_together() {
        let done = Completion::new();
        let mut first = task::spawn(done.wait());
        let mut second = task::spawn(done.wait());

        assert_pending!(first.poll());
        assert_pending!(second.poll());

        done.set("ready");
        assert!(first.is_woken());
        assert!(second.is_woken());
        assert_ready_eq!(first.poll(), "ready");
        assert_ready_eq!(second.poll(), "ready");
    }

    #[test]
    fn test_wait_after_set_is_immediate() {
        let done = Completion::new();
        done.set(7u32);
        let mut waiter = task::spawn(done.wait());
        assert_ready_eq!(waiter.poll(), 7);
    }

    #[test]
    fn test_callbacks_run_once_in_order() {
        let done = Completion::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=2 {
            let seen = Arc::clone(&seen);
            done.on_done(move |value: &String| {
                seen.lock().unwrap().push(format!("{n}: {value}"));
            });
        }
        assert!(seen.lock().unwrap().is_empty());

        done.set("the result".to_string());
        done.set("ignored".to_string());

        let late = Arc::clone(&seen);
        done.on_done(move |value| late.lock().unwrap().push(format!("late: {value}")));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["1: the result", "2: the result", "late: the result"]
        );
    }
}
