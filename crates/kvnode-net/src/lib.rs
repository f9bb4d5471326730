//! Non-blocking socket layer: the connection state machine and the
//! single-threaded acceptor that drives it from readiness events.

pub mod acceptor;
pub mod connection;

pub use acceptor::{Acceptor, DEFAULT_BUFFER_CAPACITY};
pub use connection::{Connection, PollOutcome, State};
