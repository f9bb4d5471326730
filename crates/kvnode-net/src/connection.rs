//! Per-connection read → dispatch → write → read state machine.
//!
//! A [`Connection`] owns exactly one socket, its input and output buffers,
//! and a reference to the shared [`RequestHandler`]. It never talks to the
//! selector directly — the acceptor passes it the [`Registry`] to
//! (re)register interest on — so the state machine stays unit-testable
//! without a real socket.
//!
//! Each readiness dispatch is one bounded-work step: at most one socket
//! read (or one write attempt) and at most one handler invocation. A
//! pipelined request that arrived in the same read as a completed frame is
//! not discarded — [`kvnode_proto::ConnBuffer::compact`] keeps it at the
//! front of the input buffer, and it gets framed on the next transition
//! back to `Reading`, without waiting for another socket read.

use std::io::{self, ErrorKind, Write};
use std::sync::Arc;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use kvnode_core::{HandlerOutcome, RequestHandler, StoreRepository};
use kvnode_proto::framer::{self, FrameCheck};
use kvnode_proto::ConnBuffer;
use kvnode_util::safe_panic;

/// A connection's place in the read → dispatch → write cycle.
///
/// Invariant: whenever a connection is open, its registered interest is
/// `READABLE` iff `state == Reading` and `WRITABLE` iff `state == Writing` —
/// never both, never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Reading,
    Writing,
    Closed,
}

/// What happened to a connection after one readiness dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The connection is still open; its interest set may have changed.
    Open,
    /// The connection is closed and should be dropped by the caller.
    Closed,
}

enum FrameOutcome {
    NoCompleteFrame,
    Dispatched,
    Fatal,
}

pub struct Connection<R> {
    stream: TcpStream,
    token: Token,
    state: State,
    input: ConnBuffer,
    output: ConnBuffer,
    write_pos: usize,
    handler: Arc<RequestHandler<R>>,
    /// The `Interest` last successfully registered with the selector, or
    /// `None` before the first [`register`](Self::register) call or after
    /// close. Tracked purely so [`debug_check_interest_invariant`] can
    /// compare it against `state` on every transition.
    registered_interest: Option<Interest>,
}

impl<R: StoreRepository> Connection<R> {
    pub fn new(
        stream: TcpStream,
        token: Token,
        buffer_capacity: usize,
        handler: Arc<RequestHandler<R>>,
    ) -> Self {
        Self {
            stream,
            token,
            state: State::Reading,
            input: ConnBuffer::with_capacity(buffer_capacity),
            output: ConnBuffer::with_capacity(buffer_capacity),
            write_pos: 0,
            handler,
            registered_interest: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn input_is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// The `Interest` that should currently be registered for this
    /// connection, or `None` once it is closed.
    pub fn interest(&self) -> Option<Interest> {
        match self.state {
            State::Reading => Some(Interest::READABLE),
            State::Writing => Some(Interest::WRITABLE),
            State::Closed => None,
        }
    }

    /// Registers this connection's initial (reading) interest. Called once,
    /// right after accept.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.stream, self.token, Interest::READABLE)?;
        self.registered_interest = Some(Interest::READABLE);
        debug_check_interest_invariant(self.state, self.registered_interest);
        Ok(())
    }

    /// Drives the state machine for one readiness event.
    pub fn on_ready(&mut self, registry: &Registry, readable: bool, writable: bool) -> PollOutcome {
        match self.state {
            State::Reading if readable => self.handle_readable(registry),
            State::Writing if writable => self.handle_writable(registry),
            _ => PollOutcome::Open,
        }
    }

    fn handle_readable(&mut self, registry: &Registry) -> PollOutcome {
        if !self.read_once() {
            return self.finish_closed(registry);
        }
        self.dispatch_and_apply(registry)
    }

    fn handle_writable(&mut self, registry: &Registry) -> PollOutcome {
        if !self.drain_output() {
            return self.finish_closed(registry);
        }
        match self.state {
            // Still draining: interest stays WRITABLE, nothing to reregister.
            State::Writing => PollOutcome::Open,
            // Fully drained: a pipelined frame may already be sitting in the
            // input buffer from an earlier read. Try it before reregistering
            // for READABLE, so a second concatenated request doesn't have to
            // wait for a socket event that may never come.
            State::Reading => self.dispatch_and_apply(registry),
            State::Closed => unreachable!("drain_output never leaves the connection Closed"),
        }
    }

    /// Drains the socket into the input buffer until it would block, hits
    /// EOF, or fills the buffer. `mio`'s poller is edge-triggered, so a
    /// single `read()` per readiness event is not enough: the kernel may
    /// have more bytes queued than one `read()` call returns, and no further
    /// readable edge will fire to prompt a second attempt. Returns `false`
    /// on EOF or a fatal I/O error.
    fn read_once(&mut self) -> bool {
        if self.input.writable_len() == 0 {
            tracing::warn!(token = ?self.token, "oversize request, closing connection");
            return false;
        }
        loop {
            if self.input.writable_len() == 0 {
                // Buffer filled within this edge; nothing more to read right
                // now. If the buffered bytes still don't frame a complete
                // request, the next readable event's entry check above
                // closes the connection as oversize.
                return true;
            }
            match self.input.fill_from(&mut self.stream) {
                Ok(0) => return false,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(token = ?self.token, error = %e, "read error, closing connection");
                    return false;
                }
            }
        }
    }

    /// Frames and handles at most one request currently buffered, then
    /// reregisters interest — whether or not the state actually changed,
    /// since the caller may have just flipped `Writing -> Reading` on a full
    /// drain and the OS-registered interest still needs to catch up to it.
    fn dispatch_and_apply(&mut self, registry: &Registry) -> PollOutcome {
        match self.try_handle_one_frame() {
            FrameOutcome::NoCompleteFrame => self.apply_interest(registry),
            FrameOutcome::Fatal => self.finish_closed(registry),
            FrameOutcome::Dispatched => self.apply_interest(registry),
        }
    }

    fn try_handle_one_frame(&mut self) -> FrameOutcome {
        match framer::check(self.input.filled()) {
            FrameCheck::Incomplete => FrameOutcome::NoCompleteFrame,
            FrameCheck::Malformed => {
                tracing::debug!(token = ?self.token, "malformed frame, closing connection");
                FrameOutcome::Fatal
            }
            FrameCheck::Complete(len) => {
                let request = &self.input.filled()[..len];
                let mut response = Vec::new();
                let outcome = self.handler.handle(request, &mut response);
                self.input.advance_read(len);
                self.input.compact();

                match outcome {
                    HandlerOutcome::Fatal => FrameOutcome::Fatal,
                    HandlerOutcome::Responded => {
                        self.queue_response(response);
                        FrameOutcome::Dispatched
                    }
                }
            }
        }
    }

    fn queue_response(&mut self, response: Vec<u8>) {
        self.output.clear();
        if response.len() > self.output.writable_len() {
            tracing::warn!(token = ?self.token, "response exceeds output buffer capacity, closing connection");
            self.state = State::Closed;
            return;
        }
        self.output.writable_slice()[..response.len()].copy_from_slice(&response);
        self.output.advance_write(response.len());
        self.write_pos = 0;
        self.state = State::Writing;
    }

    /// Writes as much of the output buffer as the socket accepts right now.
    /// Returns `false` on a fatal I/O error. On a full drain, transitions
    /// back to `Reading` and resets the output buffer.
    fn drain_output(&mut self) -> bool {
        loop {
            let remaining = &self.output.filled()[self.write_pos..];
            if remaining.is_empty() {
                self.output.clear();
                self.write_pos = 0;
                self.state = State::Reading;
                return true;
            }
            match self.stream.write(remaining) {
                Ok(0) => {
                    tracing::debug!(token = ?self.token, "write returned 0, closing connection");
                    return false;
                }
                Ok(n) => self.write_pos += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(token = ?self.token, error = %e, "write error, closing connection");
                    return false;
                }
            }
        }
    }

    fn apply_interest(&mut self, registry: &Registry) -> PollOutcome {
        match self.interest() {
            Some(interest) => {
                if let Err(e) = registry.reregister(&mut self.stream, self.token, interest) {
                    tracing::debug!(token = ?self.token, error = %e, "reregister failed, closing connection");
                    return self.finish_closed(registry);
                }
                self.registered_interest = Some(interest);
                debug_check_interest_invariant(self.state, self.registered_interest);
                PollOutcome::Open
            }
            None => self.finish_closed(registry),
        }
    }

    fn finish_closed(&mut self, registry: &Registry) -> PollOutcome {
        self.state = State::Closed;
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.registered_interest = None;
        debug_check_interest_invariant(self.state, self.registered_interest);
        PollOutcome::Closed
    }
}

/// Asserts the interest-set invariant holds for a connection's current
/// state: `READABLE` iff `Reading`, `WRITABLE` iff `Writing`, none once
/// `Closed`. Called after every registration change in
/// [`Connection::register`], [`Connection::apply_interest`], and
/// [`Connection::finish_closed`] — a debug-only check via `safe_panic!`, so
/// a future transition that forgets to reregister (as the `Writing ->
/// Reading` full-drain path once did) panics in tests and debug builds
/// instead of silently leaving the OS-registered interest stale.
pub fn debug_check_interest_invariant(state: State, registered: Option<Interest>) {
    let expected = match state {
        State::Reading => Some(Interest::READABLE),
        State::Writing => Some(Interest::WRITABLE),
        State::Closed => None,
    };
    if registered != expected {
        safe_panic!("interest-set invariant violated: state={state:?} registered={registered:?}");
    }
}
