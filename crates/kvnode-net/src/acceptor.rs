//! Single-threaded accept loop: owns the listening socket and the token
//! table, and dispatches readiness events to the right [`Connection`].
//!
//! This is the external collaborator the core spec assumes delivers
//! readiness notifications to the handler — connection accept,
//! registration, and key management. A deployment that wants a pool of
//! selector threads runs one `Acceptor` per thread, each with disjoint
//! connections; that pool topology lives in the binary, not here.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use kvnode_core::{RequestHandler, StoreRepository};
use kvnode_util::safe_panic;

use crate::connection::{Connection, PollOutcome};

const LISTENER_TOKEN: Token = Token(0);

/// Default capacity for each connection's input and output buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = kvnode_proto::buffer::DEFAULT_CAPACITY;

/// Accepts inbound connections on one listening socket and drives every
/// accepted [`Connection`]'s state machine from a single `mio::Poll`.
pub struct Acceptor<R> {
    poll: Poll,
    listener: TcpListener,
    handler: Arc<RequestHandler<R>>,
    buffer_capacity: usize,
    connections: HashMap<Token, Connection<R>>,
    next_token: usize,
    events: Events,
}

impl<R: StoreRepository> Acceptor<R> {
    pub fn bind(addr: std::net::SocketAddr, handler: Arc<RequestHandler<R>>) -> io::Result<Self> {
        Self::bind_with_capacity(addr, handler, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn bind_with_capacity(
        addr: std::net::SocketAddr,
        handler: Arc<RequestHandler<R>>,
        buffer_capacity: usize,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        Ok(Self {
            poll,
            listener,
            handler,
            buffer_capacity,
            connections: HashMap::new(),
            next_token: 1,
            events: Events::with_capacity(1024),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Blocks until at least one readiness event arrives (or `timeout`
    /// elapses), processing everything that's ready. Callers wanting to run
    /// a server typically call this in a loop forever.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        // mio::Events borrows `self.poll`'s internal buffer; collect the
        // small, Copy event summaries we need before touching
        // `self.connections` mutably to sidestep the aliasing.
        let pending: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|ev| (ev.token(), ev.is_readable(), ev.is_writable()))
            .collect();

        for (token, readable, writable) in pending {
            if token == LISTENER_TOKEN {
                self.accept_all()?;
                continue;
            }
            self.dispatch(token, readable, writable);
        }
        Ok(())
    }

    fn accept_all(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _peer_addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    let mut conn =
                        Connection::new(stream, token, self.buffer_capacity, Arc::clone(&self.handler));
                    if let Err(e) = conn.register(self.poll.registry()) {
                        tracing::debug!(error = %e, "failed to register accepted connection");
                        continue;
                    }
                    self.connections.insert(token, conn);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    tracing::debug!(error = %e, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(conn) = self.connections.get_mut(&token) else {
            safe_panic!("readiness event for untracked token {token:?}");
            return;
        };
        match conn.on_ready(self.poll.registry(), readable, writable) {
            PollOutcome::Open => {}
            PollOutcome::Closed => {
                self.connections.remove(&token);
            }
        }
    }
}
