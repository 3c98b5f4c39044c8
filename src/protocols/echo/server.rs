//! Server side of the echo protocol.

use crate::runtime::{StreamHandler, Transport};
use std::io;
use tracing::{debug, error};

/// Echoes every received chunk back to the peer, unmodified.
#[derive(Debug, Default)]
pub struct EchoServer {
    bytes_echoed: u64,
}

impl EchoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written back so far.
    pub fn bytes_echoed(&self) -> u64 {
        self.bytes_echoed
    }
}

impl StreamHandler for EchoServer {
    fn on_connect(&mut self, transport: &mut Transport) {
        debug!(peer = %transport.peer(), "connection accepted");
    }

    fn on_data(&mut self, transport: &mut Transport, data: &[u8]) {
        debug!(data = %data.escape_ascii(), "received");
        transport.write(data);
        self.bytes_echoed += data.len() as u64;
        debug!(data = %data.escape_ascii(), "sent");
    }

    fn on_end_of_stream(&mut self, transport: &mut Transport) {
        debug!("received EOF");
        if transport.can_write_eof() {
            transport.write_eof();
        }
    }

    fn on_closed(&mut self, cause: Option<&io::Error>) {
        match cause {
            Some(e) => error!(error = %e, "connection lost"),
            None => debug!(bytes_echoed = self.bytes_echoed(), "closing"),
        }
    }
}
