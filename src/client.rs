//! Echo client: connect once, send, half-close, wait for the echo.

use crate::config::ClientConfig;
use crate::protocols::echo::{EchoClient, Resolution};
use crate::runtime::{drive, Transport};
use crate::sync::Completion;
use crate::task::Task;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{debug, info_span, Instrument};

/// Outcome of one client run.
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub peer: SocketAddr,
    pub resolution: Resolution,
    /// Echoed bytes in arrival order
    pub response: Bytes,
}

/// Connect to `config.connect`, send the messages, and collect the response.
///
/// A refused or reset connect is returned as-is; there is no retry.
pub async fn run(config: &ClientConfig) -> io::Result<ClientReport> {
    let stream = TcpStream::connect(&config.connect).await?;
    let peer = stream.peer_addr()?;

    let messages = config
        .messages
        .iter()
        .map(|m| Bytes::copy_from_slice(m.as_bytes()))
        .collect();
    let done = Completion::new();
    let mut client = EchoClient::new(messages, done.clone());

    let connection = Task::spawn(
        "echo-client",
        async move {
            drive(stream, Transport::new(peer), &mut client).await;
            client
        }
        .instrument(info_span!("echo_client", peer = %peer)),
    );

    debug!("waiting for client to complete");
    let resolution = done.wait().await;
    let client = connection.await.map_err(io::Error::other)?;

    Ok(ClientReport {
        peer,
        resolution,
        response: client.into_response(),
    })
}
