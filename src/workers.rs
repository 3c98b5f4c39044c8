//! Producer/consumer pool over a bounded [`WorkQueue`].
//!
//! The producer enqueues the work items, then one [`WorkItem::Stop`] per
//! consumer, then joins the queue. Each consumer drains the shared queue until
//! it receives a stop marker.
//!
//! The stop count must equal the consumer count: a missing marker leaves a
//! consumer parked on `get` forever. [`run_pool`] derives both from the same
//! value so they cannot drift apart.

use crate::config::QueueConfig;
use crate::sync::{QueueError, WorkQueue};
use crate::task::{Task, TaskError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A unit of work, or the reserved marker telling one consumer to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    Job(u64),
    Stop,
}

/// What one consumer did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    pub id: usize,
    /// Jobs in the order this consumer dequeued them.
    pub processed: Vec<u64>,
}

/// Summary of a full pool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub consumers: Vec<ConsumerReport>,
    /// Total `task_done` calls, jobs and stop markers alike.
    pub marked_done: u64,
}

impl PoolReport {
    /// Total jobs processed across all consumers.
    pub fn jobs_processed(&self) -> usize {
        self.consumers.iter().map(|c| c.processed.len()).sum()
    }
}

/// Pool errors
#[derive(Debug)]
pub enum PoolError {
    Queue(QueueError),
    Task(TaskError),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Queue(e) => write!(f, "queue error: {e}"),
            PoolError::Task(e) => write!(f, "worker task failed: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<QueueError> for PoolError {
    fn from(err: QueueError) -> Self {
        PoolError::Queue(err)
    }
}

impl From<TaskError> for PoolError {
    fn from(err: TaskError) -> Self {
        PoolError::Task(err)
    }
}

/// Dequeue until a stop marker arrives, simulating `work_unit * job` of work
/// per job.
pub async fn consumer(
    id: usize,
    queue: Arc<WorkQueue<WorkItem>>,
    work_unit: Duration,
) -> Result<ConsumerReport, QueueError> {
    let mut processed = Vec::new();

    loop {
        if queue.is_empty() {
            debug!(consumer = id, "waiting for item");
        }
        let item = queue.get().await;
        debug!(consumer = id, ?item, queued = queue.len(), "has item");

        match item {
            WorkItem::Stop => {
                queue.task_done()?;
                break;
            }
            WorkItem::Job(job) => {
                let factor = u32::try_from(job).unwrap_or(u32::MAX);
                tokio::time::sleep(work_unit.saturating_mul(factor)).await;
                processed.push(job);
                queue.task_done()?;
            }
        }
    }

    info!(consumer = id, jobs = processed.len(), "consumer ending");
    Ok(ConsumerReport { id, processed })
}

/// Enqueue `jobs`, then one stop marker per consumer, then wait until every
/// entry has been marked done.
pub async fn producer<I>(queue: Arc<WorkQueue<WorkItem>>, jobs: I, consumers: usize)
where
    I: IntoIterator<Item = u64>,
{
    info!("producer starting");

    for job in jobs {
        if queue.is_full() {
            debug!(job, "queue full, producer waiting");
        }
        queue.put(WorkItem::Job(job)).await;
        debug!(job, "producer added task to queue");
    }

    debug!(consumers, "producer adding stop signals to the queue");
    for _ in 0..consumers {
        queue.put(WorkItem::Stop).await;
    }

    debug!("producer waiting for queue to empty");
    queue.join().await;
    info!("producer ending");
}

/// Run one producer and `config.consumers` consumers to completion.
pub async fn run_pool(config: &QueueConfig) -> Result<PoolReport, PoolError> {
    let queue = Arc::new(WorkQueue::new(config.capacity));
    let jobs = 0..config.items as u64;

    info!(
        capacity = queue.capacity(),
        consumers = config.consumers,
        items = config.items,
        "starting work pool"
    );

    let consumers: Vec<_> = (0..config.consumers)
        .map(|id| {
            Task::spawn(
                format!("consumer-{id}"),
                consumer(id, Arc::clone(&queue), config.work_unit),
            )
        })
        .collect();
    let producer = Task::spawn(
        "producer",
        producer(Arc::clone(&queue), jobs, config.consumers),
    );

    let mut reports = Vec::with_capacity(consumers.len());
    for task in consumers {
        reports.push(task.await??);
    }
    producer.await?;

    Ok(PoolReport {
        consumers: reports,
        marked_done: queue.completed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn config(capacity: usize, consumers: usize, items: usize) -> QueueConfig {
        QueueConfig {
            capacity,
            consumers,
            items,
            work_unit: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_consumers_six_items() {
        let report = run_pool(&config(2, 2, 6)).await.unwrap();

        assert_eq!(report.consumers.len(), 2);
        assert_eq!(report.jobs_processed(), 6);
        assert_eq!(report.marked_done, 8);

        let mut all: Vec<u64> = report
            .consumers
            .iter()
            .flat_map(|c| c.processed.iter().copied())
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marked_done_is_items_plus_consumers() {
        for (capacity, consumers, items) in [(1, 1, 0), (3, 4, 10), (0, 3, 7)] {
            let report = run_pool(&config(capacity, consumers, items)).await.unwrap();
            assert_eq!(report.marked_done, (items + consumers) as u64);
            assert_eq!(report.jobs_processed(), items);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_stops_on_marker_without_processing_it() {
        let queue = Arc::new(WorkQueue::new(4));
        queue.try_put(WorkItem::Job(1)).unwrap();
        queue.try_put(WorkItem::Stop).unwrap();
        queue.try_put(WorkItem::Job(2)).unwrap();

        let report = consumer(0, Arc::clone(&queue), Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(report.processed, vec![1]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_join_waits_for_consumers() {
        let queue = Arc::new(WorkQueue::new(2));
        let started = Instant::now();

        let consumer = Task::spawn(
            "consumer",
            consumer(0, Arc::clone(&queue), Duration::from_millis(10)),
        );
        producer(Arc::clone(&queue), [5, 5], 1).await;

        // Both jobs must be finished before join returns.
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(queue.unfinished(), 0);
        assert_eq!(consumer.await.unwrap().unwrap().processed, vec![5, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_consumer_leaves_queue_intact() {
        let queue = Arc::new(WorkQueue::new(2));
        let waiting = Task::spawn(
            "consumer",
            consumer(0, Arc::clone(&queue), Duration::ZERO),
        );
        tokio::task::yield_now().await;

        waiting.cancel();
        assert!(matches!(waiting.await, Err(TaskError::Cancelled)));

        queue.put(WorkItem::Job(1)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.unfinished(), 1);
    }
}
