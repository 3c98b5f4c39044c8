//! Cooperative runtime plumbing.
//!
//! - `Scheduler`: explicitly owned single-threaded executor
//! - `StreamHandler`: per-connection event callbacks
//! - `Transport`: the handler's view of a connection
//! - `drive`: read/dispatch/flush loop over any byte stream
//! - `ConnectionRegistry`: slab of live connections

mod connection;
mod driver;
mod handler;
mod transport;

pub use connection::{ConnectionRegistry, SharedRegistry, Tracked};
pub use driver::drive;
pub use handler::StreamHandler;
pub use transport::Transport;

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// How long `shutdown` waits for stray tasks before dropping them.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Single-threaded cooperative scheduler.
///
/// Every task spawned from inside `block_on` runs on the calling thread and
/// only yields at `.await` points.
pub struct Scheduler {
    runtime: Runtime,
}

impl Scheduler {
    /// Build a current-thread scheduler with I/O and timers enabled.
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("async-primer")
            .build()?;
        Ok(Self { runtime })
    }

    /// Run `future` to completion on this scheduler.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop the scheduler, dropping any task that is still parked.
    pub fn shutdown(self) {
        debug!("closing event loop");
        self.runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    }
}
