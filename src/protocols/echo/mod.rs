//! Echo protocol implementation.
//!
//! Raw byte stream, no framing:
//! - Client sends its chunks, then signals end-of-stream
//! - Server writes every chunk straight back, then signals end-of-stream
//!
//! Chunk boundaries are not preserved; only the byte order is.
//!
//! ```text
//! client -> "This is the message" "It will be sent" "in parts." EOF
//! server -> "This is the messageIt will be sentin parts." EOF
//! ```

pub mod client;
pub mod server;

pub use client::{EchoClient, Resolution};
pub use server::EchoServer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{drive, Transport};
    use crate::sync::Completion;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn messages() -> Vec<Bytes> {
        vec![
            Bytes::from_static(b"This is the message"),
            Bytes::from_static(b"It will be sent"),
            Bytes::from_static(b"in parts."),
        ]
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Completion signal plus a counter of how often it actually resolved.
    fn counted() -> (Completion<Resolution>, Arc<AtomicUsize>) {
        let done = Completion::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        done.on_done(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (done, count)
    }

    #[tokio::test]
    async fn test_echo_round_trip_in_memory() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (done, count) = counted();
        let mut client = EchoClient::new(messages(), done.clone());
        let mut server = EchoServer::new();

        tokio::join!(
            drive(client_io, Transport::new(addr(10000)), &mut client),
            drive(server_io, Transport::new(addr(40000)), &mut server),
        );

        let expected: Vec<u8> = messages().concat();
        assert_eq!(client.response(), expected.as_slice());
        assert_eq!(server.bytes_echoed(), expected.len() as u64);

        // End-of-stream resolved it; the later on_closed was a no-op.
        assert_eq!(done.get(), Some(Resolution::EndOfStream));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_large_message_through_small_pipe() {
        let (client_io, server_io) = tokio::io::duplex(64);
        let message: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let (done, count) = counted();
        let mut client = EchoClient::new(vec![Bytes::from(message.clone())], done.clone());
        let mut server = EchoServer::new();

        tokio::join!(
            drive(client_io, Transport::new(addr(10000)), &mut client),
            drive(server_io, Transport::new(addr(40002)), &mut server),
        );

        assert_eq!(client.response(), message.as_slice());
        assert_eq!(server.bytes_echoed(), 4096);
        assert_eq!(done.get(), Some(Resolution::EndOfStream));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_resolves_once_on_connection_loss() {
        let (client_io, server_io) = tokio::io::duplex(64);
        drop(server_io);

        let (done, count) = counted();
        let mut client = EchoClient::new(messages(), done.clone());
        drive(client_io, Transport::new(addr(10000)), &mut client).await;

        assert_eq!(done.get(), Some(Resolution::ConnectionLost));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(client.response().is_empty());
    }

    #[tokio::test]
    async fn test_server_without_half_close_still_echoes() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (done, _) = counted();
        let mut client = EchoClient::new(messages(), done.clone());
        let mut server = EchoServer::new();

        tokio::join!(
            drive(client_io, Transport::new(addr(10000)), &mut client),
            drive(
                server_io,
                Transport::new(addr(40001)).with_half_close(false),
                &mut server
            ),
        );

        assert_eq!(client.response(), messages().concat().as_slice());
        assert!(done.is_set());
    }
}
