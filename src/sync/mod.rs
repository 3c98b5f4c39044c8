//! Synchronization primitives for cooperative tasks.
//!
//! - `Completion`: one-shot, idempotent signal with done-callbacks
//! - `WorkQueue`: bounded FIFO with task-done accounting and `join`
//! - `Condition`: condition variable over an async lock

mod completion;
mod condition;
mod queue;

pub use completion::Completion;
pub use condition::Condition;
pub use queue::{QueueError, WorkQueue};
