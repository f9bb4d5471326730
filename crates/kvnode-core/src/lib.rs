//! Request-handling layer: opcode dispatch, the store collaborator
//! contracts, and error-to-wire-code mapping.
//!
//! Everything here is synchronous and I/O-free — it operates on byte slices
//! handed to it by the connection state machine in `kvnode-net` and never
//! touches a socket itself.

pub mod error;
pub mod handler;
pub mod opcode;
pub mod store;

pub use error::{ErrorCodeMapper, HandlerError, StoreError};
pub use handler::{HandlerOutcome, RequestHandler};
pub use opcode::OpCode;
pub use store::{Store, StoreRepository};
