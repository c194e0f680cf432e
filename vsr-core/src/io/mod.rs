//! Single-threaded, readiness-based event loop over non-blocking sockets.
//!
//! One [`Dispatcher`] per replica process. `run` polls the platform
//! multiplexer once (`epoll` on Linux, `kqueue` on BSD/macOS, via `mio`) and
//! returns the number of ready events; callers drive the VSR protocol from
//! the resulting readiness notifications.

pub mod connection;

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket, Type};
use tracing::{debug, warn};

use crate::error::{Result, VsrError};

pub use connection::{Connection, ConnectionState};

/// Hard cap on concurrently tracked sockets (spec resource bound R2).
pub const MAX_CONNECTIONS: usize = 64;

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Owns the platform poller, the listening socket, and the bounded table of
/// tracked peer connections.
pub struct Dispatcher {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Dispatcher {
    /// Binds a listener at `(host, port)` with `SO_REUSEADDR` and
    /// `listen(backlog = 128)`, then registers it with a fresh poller.
    pub fn bind(host: [u8; 4], port: u16) -> io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(host)), port);
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;

        let mut listener = TcpListener::from_std(socket.into());
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(MAX_CONNECTIONS + 1),
            listener,
            connections: HashMap::new(),
            next_token: 0,
        })
    }

    /// Polls once, blocking for at most `timeout_ms`. Returns the number of
    /// ready events. Accepts any pending inbound connections itself;
    /// readiness for already-tracked peer sockets is left for the caller to
    /// act on via [`Dispatcher::connection_mut`] and the returned tokens.
    pub fn run(&mut self, timeout_ms: u64) -> io::Result<Vec<Token>> {
        self.poll
            .poll(&mut self.events, Some(Duration::from_millis(timeout_ms)))?;

        let mut ready = Vec::new();
        let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == LISTENER_TOKEN {
                self.accept_pending();
            } else {
                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.mark_connected();
                }
                ready.push(token);
            }
        }
        Ok(ready)
    }

    /// Accepts every currently-pending inbound connection, subject to
    /// [`MAX_CONNECTIONS`]. Connections beyond the bound are dropped
    /// (refused) rather than queued.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.connections.len() >= MAX_CONNECTIONS {
                        warn!(%addr, "refusing connection: at MAX_CONNECTIONS");
                        drop(stream);
                        continue;
                    }
                    match self.track(stream, ConnectionState::Connected) {
                        Ok(token) => debug!(%addr, token = token.0, "accepted connection"),
                        Err(e) => warn!(%addr, error = %e, "failed to register accepted connection"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Begins a non-blocking outbound connection to `addr`, registering it
    /// in the `Connecting` state. Fails with [`VsrError::TooManyConnections`]
    /// if already at the bound.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<Token> {
        if self.connections.len() >= MAX_CONNECTIONS {
            return Err(VsrError::TooManyConnections);
        }
        let stream = TcpStream::connect(addr)?;
        self.track(stream, ConnectionState::Connecting)
            .map_err(VsrError::Io)
    }

    fn track(&mut self, mut stream: TcpStream, state: ConnectionState) -> io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.connections.insert(token, Connection::new(stream, state));
        Ok(token)
    }

    /// Closes and deregisters the connection at `token`, if tracked.
    pub fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            conn.mark_closed();
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
    }

    pub fn connection_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Exposes the poller's registry so callers can register additional
    /// event sources (signal handling) on the same `mio::Poll`.
    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_connect_round_trips() {
        let mut server = Dispatcher::bind([127, 0, 0, 1], 0).unwrap();
        // Port 0 above is for illustration only; pick a real ephemeral port
        // via bind_ephemeral in integration tests. Here we just check the
        // dispatcher starts with no connections tracked.
        assert_eq!(server.connection_count(), 0);
    }
}
