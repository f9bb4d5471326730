//! Wire-format layer for the key-value node request pipeline.
//!
//! This crate has no I/O dependency: it is the pure byte-level half of the
//! pipeline described in the workspace's design notes — a fixed-capacity
//! buffer with explicit read/write cursors, a big-endian wire codec for the
//! protocol's primitives, and a framer that measures (but never interprets)
//! one request's worth of bytes.

pub mod buffer;
pub mod codec;
pub mod framer;

pub use buffer::ConnBuffer;
pub use codec::{CodecError, Key, VectorClock, VersionedValue, WireReader, WireWriter};
pub use framer::FrameCheck;
