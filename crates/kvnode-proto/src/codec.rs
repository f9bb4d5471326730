//! Big-endian wire primitives: fixed-width integers, length-prefixed blobs
//! and strings, and the versioned-value record format.

use std::fmt;

use thiserror::Error;

/// Errors raised while decoding or encoding wire primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("short buffer: needed {needed} bytes, had {available}")]
    ShortBuffer { needed: usize, available: usize },
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
}

/// An immutable byte-sequence key. Equality and hashing are byte-wise.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Key(pub Vec<u8>);

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key(v)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A read-only cursor over a borrowed byte slice, used both by the codec
/// (for request/response bodies) and by the framer (for length-walking).
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.remaining() < n {
            Err(CodecError::ShortBuffer { needed: n, available: self.remaining() })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.need(2)?;
        let v = i16::from_be_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        let v = u16::from_be_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        let v = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        let v = u64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        let v = i64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    /// Advances past `n` bytes without copying them out, returning the
    /// skipped slice.
    pub fn skip(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// `i16 length` followed by that many UTF-8 bytes. Store names are
    /// ASCII in every realistic deployment; this implementation targets
    /// strict UTF-8 rather than modified-UTF-8's 1-3-byte NUL/supplementary
    /// encoding, which is indistinguishable from standard UTF-8 for ASCII
    /// input (see spec's design notes).
    pub fn read_utf(&mut self) -> Result<String, CodecError> {
        let len = self.read_i16()?;
        if len < 0 {
            return Err(CodecError::MalformedFrame("negative utf length"));
        }
        let bytes = self.skip(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::MalformedFrame("invalid utf8 in string field"))
    }

    /// `i32 length` followed by `length` bytes.
    pub fn read_key(&mut self) -> Result<Key, CodecError> {
        Ok(Key(self.read_blob()?))
    }

    /// `i32 length` followed by `length` bytes.
    pub fn read_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(CodecError::MalformedFrame("negative blob length"));
        }
        Ok(self.skip(len as usize)?.to_vec())
    }

    pub fn read_vector_clock(&mut self) -> Result<VectorClock, CodecError> {
        VectorClock::decode(self)
    }

    pub fn read_versioned_value(&mut self) -> Result<VersionedValue, CodecError> {
        VersionedValue::decode(self)
    }

    pub fn read_versioned_value_list(&mut self) -> Result<Vec<VersionedValue>, CodecError> {
        let n = self.read_i32()?;
        if n < 0 {
            return Err(CodecError::MalformedFrame("negative versioned value list length"));
        }
        (0..n).map(|_| self.read_versioned_value()).collect()
    }
}

/// An append-only cursor over an owned output buffer.
pub struct WireWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends raw bytes with no length prefix, for building up a payload
    /// whose own length prefix is written separately (e.g. a PUT's clock+value
    /// body).
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_utf(&mut self, s: &str) {
        self.write_i16(s.len() as i16);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_key(&mut self, key: &Key) {
        self.write_blob(&key.0);
    }

    pub fn write_blob(&mut self, bytes: &[u8]) {
        self.write_i32(bytes.len() as i32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_vector_clock(&mut self, clock: &VectorClock) {
        clock.encode(self);
    }

    pub fn write_versioned_value(&mut self, value: &VersionedValue) {
        value.encode(self);
    }

    pub fn write_versioned_value_list(&mut self, values: &[VersionedValue]) {
        self.write_i32(values.len() as i32);
        for v in values {
            self.write_versioned_value(v);
        }
    }
}

/// One (node id, version counter) entry in a vector clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockEntry {
    pub node_id: u16,
    pub version: u64,
}

/// A serializable version token with a self-describing byte length.
///
/// Wire format: `u8 format_version | i16 entry_count | entry_count *
/// (u16 node_id, u64 version) | i64 timestamp_millis`. See DESIGN.md for why
/// this exact layout was chosen (the reference peer's byte format was not
/// recoverable from the retrieval pack).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VectorClock {
    pub entries: Vec<ClockEntry>,
    pub timestamp_millis: i64,
}

const CLOCK_FORMAT_VERSION: u8 = 1;
const CLOCK_ENTRY_SIZE: usize = 2 + 8;
const CLOCK_HEADER_SIZE: usize = 1 + 2;
const CLOCK_TRAILER_SIZE: usize = 8;

impl VectorClock {
    pub fn new() -> Self {
        Self { entries: Vec::new(), timestamp_millis: 0 }
    }

    /// Number of bytes this clock occupies on the wire. Lets a mixed
    /// clock+value blob (as in a PUT payload) be split without a separate
    /// length prefix for the clock half.
    pub fn size_in_bytes(&self) -> usize {
        CLOCK_HEADER_SIZE + self.entries.len() * CLOCK_ENTRY_SIZE + CLOCK_TRAILER_SIZE
    }

    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let version = reader.read_u8()?;
        if version != CLOCK_FORMAT_VERSION {
            return Err(CodecError::MalformedFrame("unsupported vector clock format version"));
        }
        let n = reader.read_i16()?;
        if n < 0 {
            return Err(CodecError::MalformedFrame("negative vector clock entry count"));
        }
        let mut entries = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let node_id = reader.read_u16()?;
            let version = reader.read_u64()?;
            entries.push(ClockEntry { node_id, version });
        }
        let timestamp_millis = reader.read_i64()?;
        Ok(Self { entries, timestamp_millis })
    }

    pub fn encode(&self, writer: &mut WireWriter<'_>) {
        writer.write_u8(CLOCK_FORMAT_VERSION);
        writer.write_i16(self.entries.len() as i16);
        for entry in &self.entries {
            writer.write_u16(entry.node_id);
            writer.write_u64(entry.version);
        }
        writer.write_i64(self.timestamp_millis);
    }

    /// Decodes a clock from the front of `bytes`, returning the clock and the
    /// remainder as the value half of a PUT payload.
    pub fn split_clock_and_value(bytes: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let mut reader = WireReader::new(bytes);
        let clock = Self::decode(&mut reader)?;
        let consumed = reader.position();
        Ok((clock, &bytes[consumed..]))
    }
}

/// A (vector clock, value) pair: one causally-tagged revision.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VersionedValue {
    pub clock: VectorClock,
    pub value: Vec<u8>,
}

impl VersionedValue {
    pub fn new(clock: VectorClock, value: Vec<u8>) -> Self {
        Self { clock, value }
    }

    fn total_len(&self) -> usize {
        self.clock.size_in_bytes() + self.value.len()
    }

    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let total_len = reader.read_i32()?;
        if total_len < 0 {
            return Err(CodecError::MalformedFrame("negative versioned value length"));
        }
        let bytes = reader.skip(total_len as usize)?;
        let (clock, value) = VectorClock::split_clock_and_value(bytes)?;
        Ok(Self { clock, value: value.to_vec() })
    }

    pub fn encode(&self, writer: &mut WireWriter<'_>) {
        writer.write_i32(self.total_len() as i32);
        self.clock.encode(writer);
        writer.write_raw(&self.value);
    }
}
