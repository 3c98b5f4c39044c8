//! Bounded FIFO work queue with task-done accounting.
//!
//! `put` waits for room, `get` waits for an item, and `join` waits until
//! every item ever enqueued has been handed back with `task_done`.
//!
//! Invariant: `unfinished >= items.len()`. An item counts as unfinished from
//! the moment it is stored until a consumer marks it done.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Queue accounting errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `task_done` called more times than items were enqueued.
    TooManyTaskDone,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::TooManyTaskDone => write!(f, "task_done() called too many times"),
        }
    }
}

impl std::error::Error for QueueError {}

struct State<T> {
    items: VecDeque<T>,
    /// Enqueued but not yet marked done
    unfinished: usize,
    /// Total `task_done` calls
    completed: u64,
}

/// Bounded multi-producer multi-consumer queue.
pub struct WorkQueue<T> {
    /// Maximum stored items, 0 = unbounded
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Notify,
    not_full: Notify,
    all_done: Notify,
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` items (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                unfinished: 0,
                completed: 0,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            all_done: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of stored items (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.len() >= self.capacity
    }

    /// Items enqueued but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    /// Total number of successful `task_done` calls.
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Store `item` without waiting.
    ///
    /// Hands the item back if the queue is full.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        {
            let mut state = self.lock();
            if self.capacity > 0 && state.items.len() >= self.capacity {
                return Err(item);
            }
            state.items.push_back(item);
            state.unfinished += 1;
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Store `item`, waiting for room if the queue is full.
    ///
    /// Cancel-safe: dropping the future before it completes stores nothing.
    pub async fn put(&self, item: T) {
        let mut item = item;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_put(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
            notified.await;
        }
    }

    /// Take the oldest item without waiting.
    pub fn try_get(&self) -> Option<T> {
        let item = self.lock().items.pop_front()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Take the oldest item, waiting if the queue is empty.
    ///
    /// Cancel-safe: dropping the future before it completes removes nothing.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_get() {
                return item;
            }
            notified.await;
        }
    }

    /// Mark one previously dequeued item as processed.
    pub fn task_done(&self) -> Result<(), QueueError> {
        let drained = {
            let mut state = self.lock();
            if state.unfinished == 0 {
                return Err(QueueError::TooManyTaskDone);
            }
            state.unfinished -= 1;
            state.completed += 1;
            state.unfinished == 0
        };

        if drained {
            self.all_done.notify_waiters();
        }
        Ok(())
    }

    /// Wait until every enqueued item has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("unfinished", &state.unfinished)
            .finish()
    }
}
