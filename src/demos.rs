//! Small runnable demonstrations of the cooperative primitives.
//!
//! Each demo returns what it observed so it can be checked, and logs as it
//! goes so it can be watched.

use crate::sync::{Completion, Condition};
use crate::task::{self, Task, TaskError};
use clap::ValueEnum;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info};

/// Demo selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoKind {
    /// Wait for phases with a timeout, cancel the stragglers
    WaitTimeout,
    /// Cancel a task before it runs
    Cancel,
    /// Await several tasks, results in argument order
    Gather,
    /// Collect results as they finish
    AsCompleted,
    /// Chain one coroutine's output into the next
    Chain,
    /// Release several waiters with one completion signal
    Event,
    /// Hand a lock from a timer callback to waiting tasks
    Lock,
    /// Wake condition waiters one, two, then all at a time
    Condition,
    /// Done-callbacks on a completion signal
    Callbacks,
}

/// Run one demo to completion.
pub async fn run(kind: DemoKind) -> Result<(), TaskError> {
    match kind {
        DemoKind::WaitTimeout => {
            let report = wait_timeout(3, Duration::from_millis(100)).await;
            info!(completed = ?report.completed, cancelled = report.cancelled, "exiting main");
        }
        DemoKind::Cancel => match cancel().await {
            Err(TaskError::Cancelled) => info!("caught error from canceled task"),
            other => info!(result = ?other, "task result"),
        },
        DemoKind::Gather => {
            let results = gather().await?;
            info!(?results, "results");
        }
        DemoKind::AsCompleted => {
            let results = as_completed(3).await?;
            info!(?results, "results");
        }
        DemoKind::Chain => {
            let (first, second) = chain().await;
            info!(first, second, "result value");
        }
        DemoKind::Event => {
            let report = event().await?;
            info!(
                start = report.initially_set,
                end = report.finally_set,
                triggered = ?report.triggered,
                "event end state"
            );
        }
        DemoKind::Lock => {
            let order = lock().await?;
            info!(?order, "lock acquisition order");
        }
        DemoKind::Condition => {
            let order = condition(5).await?;
            info!(?order, "consumers triggered");
        }
        DemoKind::Callbacks => {
            let lines = callbacks();
            info!(?lines, "callbacks ran");
        }
    }
    Ok(())
}

async fn phase(i: u64, delay: Duration) -> String {
    info!("now in phase {i}");
    sleep(delay).await;
    info!("done with phase {i}");
    format!("phase {i} result")
}

/// What [`wait_timeout`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimeoutReport {
    pub completed: Vec<String>,
    pub cancelled: usize,
}

/// Start `phase_count` phases taking 0, 100, 200 ms..., wait `timeout`, then
/// cancel whatever is still running.
pub async fn wait_timeout(phase_count: u64, timeout: Duration) -> WaitTimeoutReport {
    let phases: Vec<_> = (0..phase_count)
        .map(|i| {
            Task::spawn(
                format!("phase {i}"),
                phase(i, Duration::from_millis(100 * i)),
            )
        })
        .collect();

    info!("wait {timeout:?} for phases to complete");
    let outcome = task::wait_timeout(phases, timeout).await;
    info!(
        "{} completed and {} pending",
        outcome.completed.len(),
        outcome.pending.len()
    );

    let completed = outcome.completed.into_iter().filter_map(Result::ok).collect();
    let cancelled = if outcome.pending.is_empty() {
        0
    } else {
        for task in &outcome.pending {
            debug!(task = task.name(), "still running");
        }
        info!("canceling tasks");
        task::cancel_all(outcome.pending).await
    };

    WaitTimeoutReport {
        completed,
        cancelled,
    }
}

/// Create a task and cancel it before it gets to run.
pub async fn cancel() -> Result<&'static str, TaskError> {
    info!("creating task");
    let task = Task::spawn("func_task", async {
        info!("now in function task");
        "task result"
    });

    info!("canceling task");
    task.cancel();
    task.await
}

/// Two phases of 2 s and 1 s; results come back in argument order.
pub async fn gather() -> Result<Vec<String>, TaskError> {
    info!("waiting for phases to complete");
    task::gather(vec![
        Task::spawn("phase 1", phase(1, Duration::from_secs(2))),
        Task::spawn("phase 2", phase(2, Duration::from_secs(1))),
    ])
    .await
}

/// Later phases finish sooner, so results arrive in reverse.
pub async fn as_completed(phase_count: u64) -> Result<Vec<String>, TaskError> {
    let phases = (0..phase_count)
        .map(|i| phase(i, Duration::from_millis(500 - 100 * i.min(4))))
        .collect();
    task::as_completed(phases).await
}

async fn call_first() -> String {
    info!("now in first");
    "first".to_string()
}

async fn call_second(arg: &str) -> String {
    info!("now in second");
    format!("second with arg: {arg}")
}

/// The outer coroutine suspends on each inner one in turn.
pub async fn chain() -> (String, String) {
    info!("wait for function first");
    let first = call_first().await;
    info!("wait for function second");
    let second = call_second(&first).await;
    (first, second)
}

/// What [`event`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub initially_set: bool,
    pub triggered: Vec<usize>,
    pub finally_set: bool,
}

/// Two coroutines wait on one signal that a timer sets after 100 ms.
pub async fn event() -> Result<EventReport, TaskError> {
    let signal = Completion::new();
    let initially_set = signal.is_set();

    let setter = signal.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        info!("setting event in callback");
        setter.set(());
    });

    let waiters: Vec<_> = (1..=2)
        .map(|n| {
            let signal = signal.clone();
            Task::spawn(format!("coroutine {n}"), async move {
                signal.wait().await;
                info!("coroutine {n} triggered");
                n
            })
        })
        .collect();
    let triggered = task::gather(waiters).await?;

    Ok(EventReport {
        initially_set,
        triggered,
        finally_set: signal.is_set(),
    })
}

/// The lock is taken up front and released by a timer; the two waiters then
/// get it in arrival order.
pub async fn lock() -> Result<Vec<usize>, TaskError> {
    let lock = Arc::new(Mutex::new(()));
    let order = Arc::new(StdMutex::new(Vec::new()));

    info!("acquiring the lock before starting coroutines");
    let held = Arc::clone(&lock).lock_owned().await;
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        info!("callback releasing lock");
        drop(held);
    });

    let waiters: Vec<_> = (1..=2)
        .map(|n| {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            Task::spawn(format!("coroutine {n}"), async move {
                info!("coroutine {n} waiting for the lock");
                let _guard = lock.lock().await;
                info!("coroutine {n} acquired lock");
                if let Ok(mut order) = order.lock() {
                    order.push(n);
                }
            })
        })
        .collect();

    info!("waiting for coroutines");
    task::gather(waiters).await?;
    let order = order.lock().map(|o| o.clone()).unwrap_or_default();
    Ok(order)
}

/// `consumers` tasks wait on a condition; a manipulator wakes one, then two,
/// then the rest. Returns consumer ids in wake order.
pub async fn condition(consumers: usize) -> Result<Vec<usize>, TaskError> {
    let condition = Arc::new(Condition::new());
    let order = Arc::new(StdMutex::new(Vec::new()));

    let waiters: Vec<_> = (0..consumers)
        .map(|n| {
            let condition = Arc::clone(&condition);
            let order = Arc::clone(&order);
            Task::spawn(format!("consumer {n}"), async move {
                let guard = condition.lock().await;
                info!("consumer {n} is waiting");
                let _guard = condition.wait(guard).await;
                info!("consumer {n} triggered");
                if let Ok(mut order) = order.lock() {
                    order.push(n);
                }
            })
        })
        .collect();

    let manipulator = {
        let condition = Arc::clone(&condition);
        Task::spawn("manipulate condition", async move {
            info!("starting manipulate condition");
            sleep(Duration::from_millis(100)).await;

            for n in 1..=2 {
                let guard = condition.lock().await;
                info!("notifying {n} consumers");
                condition.notify(n);
                drop(guard);
                sleep(Duration::from_millis(100)).await;
            }

            let _guard = condition.lock().await;
            info!("notifying remaining consumers");
            condition.notify_all();
        })
    };

    task::gather(waiters).await?;
    manipulator.await?;
    let order = order.lock().map(|o| o.clone()).unwrap_or_default();
    Ok(order)
}

/// Two callbacks registered before the result is set both see it.
pub fn callbacks() -> Vec<String> {
    let future = Completion::new();
    let lines = Arc::new(StdMutex::new(Vec::new()));

    info!("registering callbacks on future");
    for n in 1..=2 {
        let lines = Arc::clone(&lines);
        future.on_done(move |result: &String| {
            let line = format!("{n}: future done: {result}");
            info!("{line}");
            if let Ok(mut lines) = lines.lock() {
                lines.push(line);
            }
        });
    }

    info!("setting result of future");
    future.set("the result".to_string());

    lines.lock().map(|l| l.clone()).unwrap_or_default()
}
