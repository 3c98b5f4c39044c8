//! Drives a [`StreamHandler`] over any byte stream.
//!
//! Reading and writing proceed together: bytes the handler queued are written
//! out while the read side keeps delivering, so neither peer can stall the
//! other by filling its receive window. Callbacks still run one at a time.

use crate::runtime::{StreamHandler, Transport};
use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Read buffer size
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Byte counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Run `handler` against `stream` until the connection is fully closed.
///
/// Errors never escape: they end the connection and are handed to
/// [`StreamHandler::on_closed`], which fires exactly once.
pub async fn drive<S, H>(stream: S, mut transport: Transport, handler: &mut H) -> ConnStats
where
    S: AsyncRead + AsyncWrite,
    H: StreamHandler + ?Sized,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut stats = ConnStats::default();
    let mut inbound = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut pending = BytesMut::new();
    let mut cause = None;

    handler.on_connect(&mut transport);

    loop {
        if let Some(data) = transport.take_outbound() {
            pending.extend_from_slice(&data);
        }

        // End-of-stream goes out only after every queued byte.
        if pending.is_empty() && transport.eof_pending() {
            if let Err(e) = writer.shutdown().await {
                cause = Some(e);
                break;
            }
            transport.mark_local_eof();
        }

        let reading = !transport.is_closing() && transport.state().can_read();
        let writing = !pending.is_empty();
        if !reading && !writing {
            // Either teardown was requested, or the peer is done and the
            // handler kept its side open: nothing more can arrive.
            transport.close();
            break;
        }

        tokio::select! {
            biased;

            res = writer.write(&pending), if writing => match res {
                Ok(0) => {
                    cause = Some(io::Error::from(io::ErrorKind::WriteZero));
                    break;
                }
                Ok(n) => {
                    stats.bytes_out += n as u64;
                    pending.advance(n);
                }
                Err(e) => {
                    cause = Some(e);
                    break;
                }
            },

            res = reader.read_buf(&mut inbound), if reading => match res {
                Ok(0) => {
                    trace!(peer = %transport.peer(), "end of stream");
                    transport.mark_remote_eof();
                    handler.on_end_of_stream(&mut transport);
                    trace!(
                        half_closed = transport.state().is_half_closed(),
                        "after end of stream"
                    );
                }
                Ok(n) => {
                    stats.bytes_in += n as u64;
                    handler.on_data(&mut transport, &inbound);
                    inbound.clear();
                }
                Err(e) => {
                    cause = Some(e);
                    break;
                }
            },
        }
    }

    if cause.is_none() && transport.state().can_write() {
        // Best effort, the peer may already be gone.
        let _ = writer.shutdown().await;
    }

    transport.mark_closed();
    handler.on_closed(cause.as_ref());
    stats
}
