//! Connection state machine for a single request/response exchange.
//!
//! A connection is created on accept, drains the request once, writes the
//! header and the payload, and is then closed. No state survives it.

use crate::runtime::FixedBuffer;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Which part of the response is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Payload,
}

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the request bytes.
    Reading,
    /// Writing one response segment.
    Writing {
        segment: Segment,
        /// Bytes already written.
        written: usize,
        /// Total bytes to write.
        total: usize,
    },
    /// Connection is being closed.
    Closing,
}

/// Per-connection I/O deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

/// A single accepted client.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnState,
}

impl Connection {
    /// Wrap an accepted stream and apply its deadlines.
    pub fn new(stream: TcpStream, peer: SocketAddr, deadlines: Deadlines) -> io::Result<Self> {
        stream.set_read_timeout(deadlines.read)?;
        stream.set_write_timeout(deadlines.write)?;
        Ok(Self {
            stream,
            peer,
            state: ConnState::Reading,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Run the whole exchange: drain, header, payload, close.
    ///
    /// On error the stream is still closed when `self` drops.
    pub fn serve(mut self, recv: &mut FixedBuffer, header: &[u8], payload: &[u8]) -> io::Result<()> {
        self.drain_request(recv)?;
        self.write_segment(Segment::Header, header)?;
        self.write_segment(Segment::Payload, payload)?;
        self.close();
        Ok(())
    }

    /// Read once into `recv` and discard what arrived.
    ///
    /// A peer that sends nothing before the read deadline, or that has
    /// already closed its side, still gets a response.
    pub fn drain_request(&mut self, recv: &mut FixedBuffer) -> io::Result<usize> {
        debug_assert_eq!(self.state, ConnState::Reading);

        let n = match recv.read_once(&mut self.stream) {
            Ok(n) => n,
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                trace!(peer = %self.peer, "No request data before read deadline");
                0
            }
            Err(e) => {
                self.state = ConnState::Closing;
                return Err(e);
            }
        };

        trace!(
            peer = %self.peer,
            bytes = n,
            capacity = recv.capacity(),
            cut_off = recv.is_full(),
            "Request drained"
        );
        recv.clear();
        Ok(n)
    }

    /// Write all of `data`, retrying partial writes.
    pub fn write_segment(&mut self, segment: Segment, data: &[u8]) -> io::Result<()> {
        let total = data.len();
        self.state = ConnState::Writing {
            segment,
            written: 0,
            total,
        };

        let mut written = 0;
        while written < total {
            match self.stream.write(&data[written..]) {
                Ok(0) => {
                    self.state = ConnState::Closing;
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => {
                    written += n;
                    self.state = ConnState::Writing {
                        segment,
                        written,
                        total,
                    };
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = ConnState::Closing;
                    return Err(e);
                }
            }
        }

        trace!(peer = %self.peer, ?segment, bytes = total, "Segment written");
        Ok(())
    }

    /// Mark the connection for closing and signal end of response.
    pub fn close(&mut self) {
        self.state = ConnState::Closing;
        // Peer may already be gone; the socket is released on drop either way.
        let _ = self.stream.shutdown(Shutdown::Write);
        debug!(peer = %self.peer, "Connection closed");
    }
}
