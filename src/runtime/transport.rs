//! The handler's view of a connection.
//!
//! Writes are buffered here and flushed by the driver once the current
//! callback returns, so handlers stay synchronous.

use crate::runtime::connection::{ConnState, Tracked};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;

/// Per-connection transport handed to [`StreamHandler`] callbacks.
///
/// [`StreamHandler`]: crate::runtime::StreamHandler
#[derive(Debug)]
pub struct Transport {
    peer: SocketAddr,
    outbound: BytesMut,
    half_close: bool,
    eof_requested: bool,
    close_requested: bool,
    state: ConnState,
    tracked: Option<Tracked>,
}

impl Transport {
    /// Create a transport for a connection to `peer` that supports half-close.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            outbound: BytesMut::new(),
            half_close: true,
            eof_requested: false,
            close_requested: false,
            state: ConnState::Open,
            tracked: None,
        }
    }

    /// Set whether this transport may signal end-of-stream on its write side.
    pub fn with_half_close(mut self, half_close: bool) -> Self {
        self.half_close = half_close;
        self
    }

    /// Mirror every state change into a connection registry slot.
    pub fn with_tracking(mut self, tracked: Tracked) -> Self {
        tracked.update(self.state);
        self.tracked = Some(tracked);
        self
    }

    /// Remote address of the connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Queue bytes for sending. Ignored once the write side is shut.
    pub fn write(&mut self, data: &[u8]) {
        if self.eof_requested || self.close_requested {
            return;
        }
        self.outbound.extend_from_slice(data);
    }

    /// Whether [`write_eof`](Self::write_eof) is supported.
    pub fn can_write_eof(&self) -> bool {
        self.half_close
    }

    /// Signal end-of-stream on the write side after pending bytes are sent.
    pub fn write_eof(&mut self) {
        if self.half_close {
            self.eof_requested = true;
        }
    }

    /// Close the connection after pending bytes are sent.
    pub fn close(&mut self) {
        self.close_requested = true;
        self.set_state(ConnState::Closing);
    }

    /// Whether teardown has started.
    pub fn is_closing(&self) -> bool {
        matches!(self.state, ConnState::Closing | ConnState::Closed)
    }

    pub(crate) fn take_outbound(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// True when an EOF was requested but not yet sent.
    pub(crate) fn eof_pending(&self) -> bool {
        self.eof_requested && self.state.can_write()
    }

    pub(crate) fn mark_local_eof(&mut self) {
        self.set_state(self.state.on_local_eof());
    }

    pub(crate) fn mark_remote_eof(&mut self) {
        self.set_state(self.state.on_remote_eof());
    }

    pub(crate) fn mark_closed(&mut self) {
        self.set_state(ConnState::Closed);
    }

    fn set_state(&mut self, state: ConnState) {
        if self.state == state || self.state == ConnState::Closed {
            return;
        }
        self.state = state;
        if let Some(tracked) = &self.tracked {
            tracked.update(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> Transport {
        Transport::new(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }

    #[test]
    fn test_writes_are_buffered_in_order() {
        let mut t = transport();
        t.write(b"abc");
        t.write(b"def");
        assert_eq!(t.take_outbound().unwrap(), Bytes::from_static(b"abcdef"));
        assert!(t.take_outbound().is_none());
    }

    #[test]
    fn test_write_after_eof_is_dropped() {
        let mut t = transport();
        t.write(b"before");
        t.write_eof();
        t.write(b"after");
        assert_eq!(t.take_outbound().unwrap(), Bytes::from_static(b"before"));
        assert!(t.eof_pending());

        t.mark_local_eof();
        assert!(!t.eof_pending());
        assert_eq!(t.state(), ConnState::WriteClosed);
    }

    #[test]
    fn test_write_eof_without_half_close() {
        let mut t = transport().with_half_close(false);
        assert!(!t.can_write_eof());
        t.write_eof();
        assert!(!t.eof_pending());
        assert_eq!(t.state(), ConnState::Open);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut t = transport();
        t.close();
        assert!(t.is_closing());
        t.mark_closed();
        t.mark_remote_eof();
        assert_eq!(t.state(), ConnState::Closed);
    }
}
