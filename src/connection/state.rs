//! Per-Connection State
//!
//! Each accepted client gets one [`ConnectionState`], owned by exactly one
//! task (readiness) or by the operation currently in flight for it
//! (completion). It carries the fixed-size buffers and the current [`Phase`].
//!
//! ```text
//!  Accepting ──> Reading ──> Processing ──> Writing ──┐
//!                   ▲                                 │
//!                   └─────────────────────────────────┘
//!        any phase ──(EOF / error / shutdown)──> Closed
//! ```

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// Where a connection is in its request/reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepted, not yet read from
    Accepting,
    /// Waiting for a request
    Reading,
    /// Request handed to the handler
    Processing,
    /// Reply staged, waiting to be sent
    Writing,
    /// Done; the socket is dropped
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Accepting => "accepting",
            Phase::Reading => "reading",
            Phase::Processing => "processing",
            Phase::Writing => "writing",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Buffers and phase of one client connection.
#[derive(Debug)]
pub struct ConnectionState {
    peer: SocketAddr,
    phase: Phase,
    read_buf: Vec<u8>,
    read_len: usize,
    write_buf: Bytes,
}

impl ConnectionState {
    /// Creates the state for a freshly accepted connection. Both buffers are
    /// bounded by `buffer_size`.
    pub fn new(peer: SocketAddr, buffer_size: usize) -> Self {
        Self {
            peer,
            phase: Phase::Accepting,
            read_buf: vec![0; buffer_size],
            read_len: 0,
            write_buf: Bytes::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    /// Enters `Reading` and returns the space for the next read.
    pub fn begin_read(&mut self) -> &mut [u8] {
        self.phase = Phase::Reading;
        self.read_len = 0;
        &mut self.read_buf
    }

    /// Records a completed read of `n` bytes and enters `Processing`.
    pub fn finish_read(&mut self, n: usize) {
        self.read_len = n.min(self.read_buf.len());
        self.phase = Phase::Processing;
    }

    /// The bytes of the last read.
    pub fn request(&self) -> &[u8] {
        &self.read_buf[..self.read_len]
    }

    /// Stages a reply and enters `Writing`. Replies longer than the buffer
    /// are cut off at the buffer size.
    pub fn stage_reply(&mut self, reply: Bytes) {
        let len = reply.len().min(self.read_buf.len());
        self.write_buf = reply.slice(..len);
        self.phase = Phase::Writing;
    }

    /// The staged reply.
    pub fn reply(&self) -> &[u8] {
        &self.write_buf
    }

    /// Clears both buffers after a send; the connection goes back to reading.
    pub fn finish_write(&mut self) {
        self.read_len = 0;
        self.write_buf = Bytes::new();
        self.phase = Phase::Reading;
    }

    pub fn close(&mut self) {
        self.phase = Phase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(size: usize) -> ConnectionState {
        ConnectionState::new("127.0.0.1:4000".parse().unwrap(), size)
    }

    #[test]
    fn test_request_cycle() {
        let mut conn = state(16);
        assert_eq!(conn.phase(), Phase::Accepting);

        let buf = conn.begin_read();
        buf[..7].copy_from_slice(b"get key");
        conn.finish_read(7);
        assert_eq!(conn.phase(), Phase::Processing);
        assert_eq!(conn.request(), b"get key");

        conn.stage_reply(Bytes::from("NOT_FOUND"));
        assert_eq!(conn.phase(), Phase::Writing);
        assert_eq!(conn.reply(), b"NOT_FOUND");

        conn.finish_write();
        assert_eq!(conn.phase(), Phase::Reading);
        assert!(conn.request().is_empty());
        assert!(conn.reply().is_empty());

        conn.close();
        assert_eq!(conn.phase(), Phase::Closed);
    }

    #[test]
    fn test_reply_truncated_to_buffer() {
        let mut conn = state(4);
        conn.stage_reply(Bytes::from("NOT_FOUND"));
        assert_eq!(conn.reply(), b"NOT_");
    }

    #[test]
    fn test_read_space_is_bounded() {
        let mut conn = state(8);
        assert_eq!(conn.begin_read().len(), 8);
        conn.finish_read(100);
        assert_eq!(conn.request().len(), 8);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Processing.to_string(), "processing");
        assert_eq!(Phase::Closed.to_string(), "closed");
    }
}
