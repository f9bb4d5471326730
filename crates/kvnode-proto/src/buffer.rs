//! Fixed-capacity byte buffer with independent read/write cursors.
//!
//! Re-expresses the "flip a shared buffer between read-mode and write-mode"
//! idiom as a pair of explicit cursors into one backing `Vec<u8>`: bytes in
//! `[read_pos, write_pos)` have been read from the socket but not yet
//! consumed by a handler. There is no implicit mode switch, so a connection
//! can never observe the buffer in the wrong mode on entry to the handler.
//!
//! Capacity is fixed at construction and never grows: a single request or
//! response is assumed to fit, per the protocol's buffer-capacity invariant.
//! Exceeding it is a protocol violation, not a buffer bug.

use std::io;

/// Default capacity for both the input and output buffer of a connection.
pub const DEFAULT_CAPACITY: usize = 64_000;

/// A fixed-capacity byte buffer with independent read and write cursors.
#[derive(Debug)]
pub struct ConnBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl ConnBuffer {
    /// Creates an empty buffer with the given fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity], read_pos: 0, write_pos: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently buffered but not yet consumed.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// The writable tail of the backing array, for a socket read to fill
    /// directly with no intermediate copy.
    #[inline]
    pub fn writable_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }

    /// Room left to write into before the buffer is full.
    #[inline]
    pub fn writable_len(&self) -> usize {
        self.data.len() - self.write_pos
    }

    /// Advances the write cursor after bytes were written into
    /// [`writable_slice`](Self::writable_slice), e.g. by a socket read.
    ///
    /// # Panics
    /// Panics if `n` would advance the write cursor past capacity.
    pub fn advance_write(&mut self, n: usize) {
        assert!(self.write_pos + n <= self.data.len(), "ConnBuffer write overrun");
        self.write_pos += n;
    }

    /// Marks `n` buffered bytes as consumed by a handler.
    ///
    /// # Panics
    /// Panics if `n` exceeds the currently filled length.
    pub fn advance_read(&mut self, n: usize) {
        assert!(self.read_pos + n <= self.write_pos, "ConnBuffer read overrun");
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// Shifts any unconsumed bytes to the front of the backing array.
    ///
    /// This is the non-destructive alternative to clearing the whole buffer:
    /// bytes belonging to a pipelined next request (already delivered by one
    /// socket read alongside a completed frame) survive past
    /// [`advance_read`](Self::advance_read) instead of being discarded.
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    /// Resets the buffer to empty without touching its backing allocation.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Reads directly from `source` into the writable tail, advancing the
    /// write cursor by however many bytes were read. Returns `Ok(0)` on EOF,
    /// same convention as `Read::read`.
    pub fn fill_from<R: io::Read>(&mut self, source: &mut R) -> io::Result<usize> {
        if self.writable_len() == 0 {
            return Ok(0);
        }
        let n = source.read(self.writable_slice())?;
        self.advance_write(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_is_empty() {
        let buf = ConnBuffer::with_capacity(16);
        assert!(buf.is_empty());
        assert_eq!(buf.filled(), &[] as &[u8]);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut buf = ConnBuffer::with_capacity(16);
        buf.writable_slice()[..5].copy_from_slice(b"hello");
        buf.advance_write(5);
        assert_eq!(buf.filled(), b"hello");
        buf.advance_read(5);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_consume_preserves_tail() {
        let mut buf = ConnBuffer::with_capacity(16);
        buf.writable_slice()[..6].copy_from_slice(b"abcdef");
        buf.advance_write(6);
        buf.advance_read(3);
        assert_eq!(buf.filled(), b"def");
    }

    #[test]
    fn compact_shifts_tail_to_front_freeing_capacity() {
        let mut buf = ConnBuffer::with_capacity(8);
        buf.writable_slice()[..8].copy_from_slice(b"abcdefgh");
        buf.advance_write(8);
        buf.advance_read(6);
        assert_eq!(buf.filled(), b"gh");
        assert_eq!(buf.writable_len(), 0);
        buf.compact();
        assert_eq!(buf.filled(), b"gh");
        assert_eq!(buf.writable_len(), 6);
    }

    #[test]
    fn advance_read_to_completion_resets_cursors() {
        let mut buf = ConnBuffer::with_capacity(8);
        buf.writable_slice()[..4].copy_from_slice(b"data");
        buf.advance_write(4);
        buf.advance_read(4);
        assert_eq!(buf.writable_len(), 8);
    }

    #[test]
    #[should_panic(expected = "ConnBuffer write overrun")]
    fn write_overrun_panics() {
        let mut buf = ConnBuffer::with_capacity(4);
        buf.advance_write(5);
    }

    #[test]
    fn fill_from_reads_into_tail() {
        let mut buf = ConnBuffer::with_capacity(16);
        let mut source: &[u8] = b"payload";
        let n = buf.fill_from(&mut source).unwrap();
        assert_eq!(n, 7);
        assert_eq!(buf.filled(), b"payload");
    }
}
