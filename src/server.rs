//! TCP server for echo connections.
//!
//! Accepts connections until the shutdown future resolves, runs an
//! [`EchoServer`] handler per connection, then releases the listener and
//! drains live connections within a grace period.

use crate::config::ServerConfig;
use crate::protocols::echo::EchoServer;
use crate::runtime::{drive, ConnectionRegistry, SharedRegistry, Tracked, Transport};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    registry: SharedRegistry,
}

impl Server {
    /// Resolve the configured address and start listening.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let addr = lookup_host(&config.listen).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no address for {}", config.listen),
            )
        })?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        let local = listener.local_addr()?;
        info!("start up on {} port {}", local.ip(), local.port());

        let registry = Arc::new(Mutex::new(ConnectionRegistry::new(config.max_connections)));
        Ok(Server {
            config,
            listener,
            registry,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Live connection registry.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                res = self.listener.accept() => match res {
                    Ok((stream, peer)) => self.spawn_connection(&mut connections, stream, peer),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },

                Some(res) = connections.join_next() => {
                    if let Err(e) = res {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        info!("closing server");
        let Server {
            config,
            listener,
            registry,
        } = self;
        drop(listener);

        if let Ok(registry) = registry.lock() {
            if !registry.is_empty() {
                debug!(live = registry.len(), "draining connections");
            }
            for (id, conn) in registry.iter() {
                debug!(id, peer = %conn.peer, state = ?conn.state, "waiting for connection to finish");
            }
        }

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
            warn!(
                remaining = connections.len(),
                "grace period elapsed, aborting connections"
            );
            connections.shutdown().await;
        }

        info!("server closed");
        Ok(())
    }

    fn spawn_connection(&self, connections: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        let Some(tracked) = Tracked::register(&self.registry, peer) else {
            warn!(peer = %peer, "connection limit reached, refusing");
            return;
        };

        debug!(peer = %peer, id = tracked.id(), "New connection");
        let transport = Transport::new(peer)
            .with_half_close(self.config.half_close)
            .with_tracking(tracked);
        let span = info_span!("echo_server", peer = %peer);

        connections.spawn(
            async move {
                let mut handler = EchoServer::new();
                let stats = drive(stream, transport, &mut handler).await;
                trace!(
                    bytes_in = stats.bytes_in,
                    bytes_out = stats.bytes_out,
                    "connection finished"
                );
            }
            .instrument(span),
        );
    }
}

/// Build a non-blocking listener with `SO_REUSEADDR` so a restarted server can
/// rebind while old sockets sit in TIME_WAIT.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
