//! A single non-blocking peer connection tracked by the [`super::Dispatcher`].

use mio::net::TcpStream;

/// Lifecycle of one tracked socket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// Outbound connect in flight; becomes `Connected` on write-readiness.
    Connecting,
    /// Ready for normal-case traffic.
    Connected,
    /// Torn down, either explicitly or by a remote hangup.
    Closed,
}

/// A tracked socket plus the small amount of read/write buffering the
/// envelope codec needs to reassemble fixed-size frames from a byte stream.
pub struct Connection {
    pub stream: TcpStream,
    pub state: ConnectionState,
    pub peer_replica_id: Option<u8>,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
}

impl Connection {
    /// Wraps a freshly accepted or connecting stream.
    pub fn new(stream: TcpStream, state: ConnectionState) -> Self {
        Self {
            stream,
            state,
            peer_replica_id: None,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
        }
    }

    /// Transitions `Connecting -> Connected` on the first write-readiness
    /// event for an outbound socket. A no-op for any other current state.
    pub fn mark_connected(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
        }
    }

    /// Marks this connection closed. Idempotent.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}
