//! async-primer: cooperative I/O and task coordination on one thread
//!
//! Subcommands:
//! - `server`: echo server, half-closes after the client does
//! - `client`: sends a few messages to the echo server and prints the reply
//! - `queue`: producer/consumer pool over a bounded work queue
//! - `demo`: small runnable demonstrations of the task primitives
//!
//! Configuration via CLI arguments or TOML file.

mod client;
mod config;
mod demos;
mod protocols;
mod runtime;
mod server;
mod sync;
mod task;
mod workers;

use config::{Config, Mode};
use runtime::Scheduler;
use server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let scheduler = Scheduler::new()?;
    let result = scheduler.block_on(run(config.mode));
    scheduler.shutdown();
    result
}

async fn run(mode: Mode) -> Result<(), Box<dyn std::error::Error>> {
    match mode {
        Mode::Server(config) => {
            info!(
                listen = %config.listen,
                max_connections = config.max_connections,
                "Starting echo server"
            );
            let server = Server::bind(config).await?;
            let addr = server.local_addr()?;
            let registry = server.registry();
            info!(%addr, "serving until ctrl-c");

            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for ctrl-c");
                    }
                })
                .await?;

            let leftover = registry.lock().map(|r| r.len()).unwrap_or(0);
            info!(leftover, "server stopped");
        }

        Mode::Client(config) => {
            let report = client::run(&config).await?;
            info!(peer = %report.peer, resolution = ?report.resolution, "client done");
            println!("{}", String::from_utf8_lossy(&report.response));
        }

        Mode::Queue(config) => {
            info!(
                capacity = config.capacity,
                consumers = config.consumers,
                items = config.items,
                "Starting work pool"
            );
            let report = workers::run_pool(&config).await?;
            for consumer in &report.consumers {
                info!(
                    consumer = consumer.id,
                    processed = ?consumer.processed,
                    "consumer finished"
                );
            }
            info!(
                jobs = report.jobs_processed(),
                marked_done = report.marked_done,
                "queue drained"
            );
        }

        Mode::Demo(kind) => {
            info!(demo = ?kind, "Running demo");
            demos::run(kind).await?;
        }
    }
    Ok(())
}
