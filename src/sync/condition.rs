//! Condition variable for async tasks.
//!
//! Waiters release the lock while parked and re-acquire it before `wait`
//! returns. `notify(n)` wakes at most `n` live waiters in arrival order;
//! waiters that were cancelled are skipped.

use std::collections::VecDeque;
use std::sync::{Mutex as StdMutex, PoisonError};
use tokio::sync::{oneshot, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct Condition {
    lock: Mutex<()>,
    waiters: StdMutex<VecDeque<oneshot::Sender<()>>>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the underlying lock.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Release `guard`, wait for a notification, then re-acquire the lock.
    pub async fn wait<'a>(&'a self, guard: MutexGuard<'a, ()>) -> MutexGuard<'a, ()> {
        let (wake, woken) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(wake);
        drop(guard);

        // The sender lives in `self`, so this only errors if it was dropped
        // without a notification, which cannot happen while we borrow `self`.
        let _ = woken.await;
        self.lock.lock().await
    }

    /// Wake up to `n` waiters. Returns how many were woken.
    pub fn notify(&self, n: usize) -> usize {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut woken = 0;
        while woken < n {
            match waiters.pop_front() {
                Some(wake) => {
                    if wake.send(()).is_ok() {
                        woken += 1;
                    }
                }
                None => break,
            }
        }
        woken
    }

    /// Wake every current waiter. Returns how many were woken.
    pub fn notify_all(&self) -> usize {
        self.notify(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_notify_without_waiters_is_noop() {
        let condition = Condition::new();
        assert_eq!(condition.notify(3), 0);
        assert_eq!(condition.notify_all(), 0);
    }

    #[test]
    fn test_notify_wakes_requested_count() {
        let condition = Condition::new();
        let condition = &condition;
        let mut waiters: Vec<_> = (0..3)
            .map(|_| {
                task::spawn(async move {
                    let guard = condition.lock().await;
                    let _guard = condition.wait(guard).await;
                })
            })
            .collect();
        for waiter in waiters.iter_mut() {
            assert_pending!(waiter.poll());
        }

        assert_eq!(condition.notify(1), 1);
        assert_ready!(waiters[0].poll());
        assert_pending!(waiters[1].poll());

        assert_eq!(condition.notify_all(), 2);
        assert_ready!(waiters[1].poll());
        assert_ready!(waiters[2].poll());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let condition = Arc::new(Condition::new());

        let cancelled = {
            let condition = Arc::clone(&condition);
            tokio::spawn(async move {
                let guard = condition.lock().await;
                let _guard = condition.wait(guard).await;
            })
        };
        let survivor = {
            let condition = Arc::clone(&condition);
            tokio::spawn(async move {
                let guard = condition.lock().await;
                let _guard = condition.wait(guard).await;
            })
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        cancelled.abort();
        let _ = cancelled.await;

        assert_eq!(condition.notify(1), 1);
        survivor.await.unwrap();
    }
}
