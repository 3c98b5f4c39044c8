//! Named task handles with explicit cancellation.
//!
//! Awaiting a [`Task`] yields `Err(TaskError::Cancelled)` if it was cancelled
//! before finishing. Cancelling one task never touches another.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::debug;

/// Why awaiting a task produced no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task was cancelled before it finished.
    Cancelled,
    /// The task panicked.
    Panicked(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task was cancelled"),
            TaskError::Panicked(msg) => write!(f, "task panicked: {msg}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<JoinError> for TaskError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            TaskError::Cancelled
        } else {
            TaskError::Panicked(err.to_string())
        }
    }
}

/// Handle to a spawned task.
#[derive(Debug)]
pub struct Task<T> {
    name: String,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Task<T> {
    /// Spawn `future` on the current scheduler.
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "creating task");
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }
}

impl<T> Task<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has finished (including by cancellation).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation. The task stops at its next suspension point.
    pub fn cancel(&self) {
        debug!(task = %self.name, "cancelling task");
        self.handle.abort();
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|res| res.map_err(TaskError::from))
    }
}

/// Result of [`wait_timeout`].
#[derive(Debug)]
pub struct WaitOutcome<T> {
    pub completed: Vec<Result<T, TaskError>>,
    pub pending: Vec<Task<T>>,
}

/// Wait up to `timeout` for `tasks`, splitting them into finished results and
/// tasks still running at the deadline. Pending tasks are left running.
pub async fn wait_timeout<T>(tasks: Vec<Task<T>>, timeout: Duration) -> WaitOutcome<T> {
    let deadline = Instant::now() + timeout;
    let mut completed = Vec::new();
    let mut pending = Vec::new();

    for mut task in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(result) => completed.push(result),
            Err(_) => pending.push(task),
        }
    }

    WaitOutcome { completed, pending }
}

/// Cancel every task and wait for each to stop.
///
/// Returns how many observed the cancellation (as opposed to finishing
/// first).
pub async fn cancel_all<T>(tasks: Vec<Task<T>>) -> usize {
    for task in tasks.iter().filter(|t| !t.is_finished()) {
        task.cancel();
    }

    let mut cancelled = 0;
    for task in tasks {
        if let Err(TaskError::Cancelled) = task.await {
            cancelled += 1;
        }
    }
    cancelled
}

/// Await every task and return results in argument order.
///
/// The first failure is returned; the remaining tasks keep running.
pub async fn gather<T>(tasks: Vec<Task<T>>) -> Result<Vec<T>, TaskError> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await?);
    }
    Ok(results)
}

/// Run `futures` concurrently and collect their outputs in completion order.
pub async fn as_completed<T, F>(futures: Vec<F>) -> Result<Vec<T>, TaskError>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let mut set = JoinSet::new();
    for future in futures {
        set.spawn(future);
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(res) = set.join_next().await {
        results.push(res?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_task_result() {
        let task = Task::spawn("double", async { 2 * 21 });
        assert_eq!(task.name(), "double");
        assert_eq!(task.await, Ok(42));
    }

    #[tokio::test]
    async fn test_cancelled_task_raises_cancelled() {
        let task = Task::spawn("never", async {
            sleep(Duration::from_secs(3600)).await;
            "task result"
        });
        task.cancel();
        assert_eq!(task.await, Err(TaskError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll() {
        let task = Task::spawn("immediate", async { "task result" });
        task.cancel();
        assert_eq!(task.await, Err(TaskError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_leaves_siblings_running() {
        let doomed = Task::spawn("doomed", sleep(Duration::from_secs(10)));
        let sibling = Task::spawn("sibling", async {
            sleep(Duration::from_millis(50)).await;
            "sibling done"
        });

        doomed.cancel();
        assert_eq!(doomed.await, Err(TaskError::Cancelled));
        assert_eq!(sibling.await, Ok("sibling done"));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let task: Task<()> = Task::spawn("boom", async { panic!("boom") });
        assert!(matches!(task.await, Err(TaskError::Panicked(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_splits_and_cancels() {
        let tasks: Vec<_> = (0..3u64)
            .map(|i| {
                Task::spawn(format!("phase {i}"), async move {
                    sleep(Duration::from_millis(100 * i)).await;
                    i
                })
            })
            .collect();

        let outcome = wait_timeout(tasks, Duration::from_millis(50)).await;
        assert_eq!(outcome.completed, vec![Ok(0)]);
        assert_eq!(outcome.pending.len(), 2);
        assert!(outcome.pending.iter().all(|t| !t.is_finished()));

        assert_eq!(cancel_all(outcome.pending).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_keeps_argument_order() {
        let slow = Task::spawn("slow", async {
            sleep(Duration::from_secs(2)).await;
            "phase 1 result"
        });
        let fast = Task::spawn("fast", async {
            sleep(Duration::from_secs(1)).await;
            "phase 2 result"
        });
        assert_eq!(
            gather(vec![slow, fast]).await,
            Ok(vec!["phase 1 result", "phase 2 result"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_as_completed_orders_by_finish() {
        let phases: Vec<_> = (0..3u64)
            .map(|i| async move {
                sleep(Duration::from_millis(500 - 100 * i)).await;
                i
            })
            .collect();
        assert_eq!(as_completed(phases).await, Ok(vec![2, 1, 0]));
    }
}
