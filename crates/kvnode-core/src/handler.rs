//! Request handler: parses one already-framed request, dispatches to the
//! store, and serializes the response or error.
//!
//! This is the only layer that knows what an opcode *means* — the framer
//! upstream only knows how many bytes it occupies.

use kvnode_proto::{CodecError, VectorClock, VersionedValue, WireReader, WireWriter};

use crate::error::{ErrorCodeMapper, HandlerError};
use crate::opcode::OpCode;
use crate::store::{Store, StoreRepository};

/// What the caller should do once [`RequestHandler::handle`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Exactly one response was written to the output buffer. The
    /// connection stays open.
    Responded,
    /// The request could not be safely handled at all (unknown opcode, or a
    /// codec error past the point the framer already validated). Nothing
    /// was written to the output buffer; the caller must close the
    /// connection rather than try to send a response for it.
    Fatal,
}

/// Dispatches framed requests against a [`StoreRepository`].
///
/// Stateless and cheap to share: one instance serves every connection on
/// every selector thread.
pub struct RequestHandler<R> {
    repository: R,
    mapper: ErrorCodeMapper,
}

impl<R: StoreRepository> RequestHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository, mapper: ErrorCodeMapper }
    }

    /// Consumes exactly one framed request from `input` and writes exactly
    /// one response (success or error) to `out`, except on
    /// [`HandlerOutcome::Fatal`] where `out` is left untouched.
    pub fn handle(&self, input: &[u8], out: &mut Vec<u8>) -> HandlerOutcome {
        match self.dispatch(input, out) {
            Ok(()) => HandlerOutcome::Responded,
            Err(err) if err.is_fatal() => {
                tracing::warn!(error = %err, "closing connection after unhandleable request");
                HandlerOutcome::Fatal
            }
            Err(err) => {
                tracing::debug!(error = %err, "request failed, encoding error response");
                self.write_error(out, &err);
                HandlerOutcome::Responded
            }
        }
    }

    fn dispatch(&self, input: &[u8], out: &mut Vec<u8>) -> Result<(), HandlerError> {
        let mut reader = WireReader::new(input);
        let op_byte = reader.read_u8()?;
        let store_name = reader.read_utf()?;
        let is_routed = reader.read_u8()? != 0;

        // Store resolution happens before the opcode is even validated: an
        // unknown store and an unknown opcode can both be present, and the
        // wire contract resolves the store first.
        let store = self
            .repository
            .get(&store_name, is_routed)
            .ok_or(HandlerError::NoSuchStore(store_name))?;

        let op = OpCode::try_from(op_byte).map_err(HandlerError::UnknownOpcode)?;

        match op {
            OpCode::Get => self.handle_get(&mut reader, store.as_ref(), out),
            OpCode::GetAll => self.handle_get_all(&mut reader, store.as_ref(), out),
            OpCode::Put => self.handle_put(&mut reader, store.as_ref(), out),
            OpCode::Delete => self.handle_delete(&mut reader, store.as_ref(), out),
        }
    }

    fn handle_get(
        &self,
        reader: &mut WireReader<'_>,
        store: &dyn Store,
        out: &mut Vec<u8>,
    ) -> Result<(), HandlerError> {
        let key = reader.read_key()?;
        let values = store.get(&key)?;
        let mut w = WireWriter::new(out);
        w.write_i16(0);
        w.write_versioned_value_list(&values);
        Ok(())
    }

    fn handle_get_all(
        &self,
        reader: &mut WireReader<'_>,
        store: &dyn Store,
        out: &mut Vec<u8>,
    ) -> Result<(), HandlerError> {
        let n = reader.read_i32()?;
        if n < 0 {
            return Err(HandlerError::Codec(CodecError::MalformedFrame("negative key count in GET_ALL")));
        }
        let mut keys = Vec::with_capacity(n as usize);
        for _ in 0..n {
            keys.push(reader.read_key()?);
        }
        let results = store.get_all(&keys)?;

        let mut w = WireWriter::new(out);
        w.write_i16(0);
        w.write_i32(results.len() as i32);
        for (key, values) in &results {
            w.write_key(key);
            w.write_versioned_value_list(values);
        }
        Ok(())
    }

    fn handle_put(
        &self,
        reader: &mut WireReader<'_>,
        store: &dyn Store,
        out: &mut Vec<u8>,
    ) -> Result<(), HandlerError> {
        let key = reader.read_key()?;
        let blob = reader.read_blob()?;
        let (clock, value) = VectorClock::split_clock_and_value(&blob)?;
        store.put(key, VersionedValue::new(clock, value.to_vec()))?;
        WireWriter::new(out).write_i16(0);
        Ok(())
    }

    fn handle_delete(
        &self,
        reader: &mut WireReader<'_>,
        store: &dyn Store,
        out: &mut Vec<u8>,
    ) -> Result<(), HandlerError> {
        let key = reader.read_key()?;
        let version_size = reader.read_i16()?;
        if version_size < 0 {
            return Err(HandlerError::Codec(CodecError::MalformedFrame("negative version length in DELETE")));
        }
        let clock_bytes = reader.skip(version_size as usize)?;
        let clock = VectorClock::decode(&mut WireReader::new(clock_bytes))?;
        let succeeded = store.delete(&key, &clock)?;

        let mut w = WireWriter::new(out);
        w.write_i16(0);
        w.write_u8(u8::from(succeeded));
        Ok(())
    }

    fn write_error(&self, out: &mut Vec<u8>, err: &HandlerError) {
        let code = self.mapper.code(err);
        let mut w = WireWriter::new(out);
        w.write_i16(code);
        w.write_utf(&err.to_string());
    }
}
