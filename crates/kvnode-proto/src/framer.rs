//! Length-walking framer: measures one request's worth of bytes without
//! interpreting what they mean.
//!
//! [`check`] walks a candidate buffer the same way the handler will later
//! walk it — opcode, store name, routing flag, opcode-specific fields — but
//! only to count bytes. It never allocates a `Key`, never decodes a vector
//! clock, and never touches a store. That split exists so a connection can
//! decide whether it has a complete frame yet using exactly the same field
//! widths the handler will use, without paying for a full decode on every
//! partial read.

use crate::codec::{CodecError, WireReader};

/// Opcodes the framer needs to recognize to know which trailing fields to
/// skip. Unlike [`crate::codec`], this has no behavioral meaning here — an
/// unrecognized opcode is simply framed at the position the framer has
/// already reached (header + store name + routing flag), leaving it to the
/// handler to reject.
mod opcode {
    pub const GET: u8 = 0x01;
    pub const GET_ALL: u8 = 0x02;
    pub const PUT: u8 = 0x03;
    pub const DELETE: u8 = 0x04;
}

/// Result of attempting to measure one frame at the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    /// Not enough bytes yet to know the frame's length; try again once more
    /// bytes arrive.
    Incomplete,
    /// A complete frame occupies `[0, len)`.
    Complete(usize),
    /// The bytes present can never form a valid frame (e.g. a negative
    /// length field) regardless of how many more bytes arrive.
    Malformed,
}

/// Walks `buf` from the start, measuring the length of one request.
///
/// Never panics and never reads past `buf`'s end: every field read goes
/// through [`WireReader`], which turns an out-of-bounds read into
/// `Incomplete` rather than indexing past the slice.
pub fn check(buf: &[u8]) -> FrameCheck {
    let mut reader = WireReader::new(buf);
    match walk(&mut reader) {
        Ok(()) => FrameCheck::Complete(reader.position()),
        Err(CodecError::ShortBuffer { .. }) => FrameCheck::Incomplete,
        Err(CodecError::MalformedFrame(_)) => FrameCheck::Malformed,
    }
}

fn walk(reader: &mut WireReader<'_>) -> Result<(), CodecError> {
    let op = reader.read_u8()?;
    skip_utf(reader)?; // store name
    reader.read_u8()?; // is_routed flag

    match op {
        opcode::GET => {
            skip_key(reader)?;
        }
        opcode::GET_ALL => {
            let n = reader.read_i32()?;
            if n < 0 {
                return Err(CodecError::MalformedFrame("negative key count in GET_ALL"));
            }
            for _ in 0..n {
                skip_key(reader)?;
            }
        }
        opcode::PUT => {
            skip_key(reader)?;
            let data_len = reader.read_i32()?;
            if data_len < 0 {
                return Err(CodecError::MalformedFrame("negative data length in PUT"));
            }
            reader.skip(data_len as usize)?;
        }
        opcode::DELETE => {
            skip_key(reader)?;
            let version_len = reader.read_i16()?;
            if version_len < 0 {
                return Err(CodecError::MalformedFrame("negative version length in DELETE"));
            }
            reader.skip(version_len as usize)?;
        }
        _ => {
            // Unknown opcode: the frame ends right after the header the
            // framer already knows how to read. The handler decides what an
            // unrecognized opcode means.
        }
    }
    Ok(())
}

fn skip_utf(reader: &mut WireReader<'_>) -> Result<(), CodecError> {
    let len = reader.read_i16()?;
    if len < 0 {
        return Err(CodecError::MalformedFrame("negative utf length"));
    }
    reader.skip(len as usize)?;
    Ok(())
}

fn skip_key(reader: &mut WireReader<'_>) -> Result<(), CodecError> {
    let len = reader.read_i32()?;
    if len < 0 {
        return Err(CodecError::MalformedFrame("negative key length"));
    }
    reader.skip(len as usize)?;
    Ok(())
}
