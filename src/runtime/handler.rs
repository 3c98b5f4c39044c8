//! Event interface implemented by per-connection handlers.

use crate::runtime::Transport;
use std::io;

/// Callbacks fired by the driver for one connection.
///
/// Callbacks run to completion without suspending. Anything written to the
/// transport is flushed before the next read.
pub trait StreamHandler {
    /// The connection is established.
    fn on_connect(&mut self, transport: &mut Transport);

    /// A chunk arrived. Chunk boundaries carry no meaning.
    fn on_data(&mut self, transport: &mut Transport, data: &[u8]);

    /// The peer signaled end-of-stream. No more data will arrive.
    fn on_end_of_stream(&mut self, transport: &mut Transport);

    /// The connection is gone. Fires exactly once, last.
    ///
    /// `cause` is `None` for a clean close.
    fn on_closed(&mut self, cause: Option<&io::Error>);
}
