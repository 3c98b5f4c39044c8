//! Client side of the echo protocol.

use crate::runtime::{StreamHandler, Transport};
use crate::sync::Completion;
use bytes::{Bytes, BytesMut};
use std::io;
use tracing::{debug, warn};

/// Which event resolved the client's completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The server half-closed after echoing.
    EndOfStream,
    /// The connection went away first.
    ConnectionLost,
}

/// Sends a fixed list of chunks, half-closes, and collects the echo.
#[derive(Debug)]
pub struct EchoClient {
    messages: Vec<Bytes>,
    done: Completion<Resolution>,
    response: BytesMut,
}

impl EchoClient {
    /// `done` resolves once, on end-of-stream or connection loss.
    pub fn new(messages: Vec<Bytes>, done: Completion<Resolution>) -> Self {
        Self {
            messages,
            done,
            response: BytesMut::new(),
        }
    }

    /// Everything received so far, in arrival order.
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub fn into_response(self) -> Bytes {
        self.response.freeze()
    }
}

impl StreamHandler for EchoClient {
    fn on_connect(&mut self, transport: &mut Transport) {
        let peer = transport.peer();
        debug!("connecting to {} port {}", peer.ip(), peer.port());

        for msg in &self.messages {
            transport.write(msg);
            debug!(data = %msg.escape_ascii(), "sending");
        }

        if transport.can_write_eof() {
            transport.write_eof();
        }
    }

    fn on_data(&mut self, _transport: &mut Transport, data: &[u8]) {
        debug!(data = %data.escape_ascii(), "received");
        self.response.extend_from_slice(data);
    }

    fn on_end_of_stream(&mut self, transport: &mut Transport) {
        debug!(received = self.response().len(), "received EOF");
        transport.close();
        self.done.set(Resolution::EndOfStream);
    }

    fn on_closed(&mut self, cause: Option<&io::Error>) {
        match cause {
            Some(e) => warn!(error = %e, "connection lost"),
            None => debug!("server closed connection"),
        }
        self.done.set(Resolution::ConnectionLost);
    }
}
