//! Streaming write path.
//!
//! Engines serialize a container by pushing chunks into a [`WriteSink`] in
//! order. [`ByteAccumulator`] collects those chunks into one owned buffer.
//! A failing sink makes the engine abort its write loop; whatever was
//! accumulated so far is dropped together with the sink.

use crate::error::CodecError;

/// Receiver of serialized container bytes.
pub trait WriteSink {
    /// Append one chunk. Chunks arrive in output order.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CodecError>;
}

impl WriteSink for Vec<u8> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        self.try_reserve(chunk.len())
            .map_err(|_| CodecError::out_of_memory("Memory allocation failed during write"))?;
        self.extend_from_slice(chunk);
        Ok(())
    }
}

/// Growable in-memory output for `write_to_bytes`.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    buf: Vec<u8>,
    chunks: usize,
    max_len: Option<usize>,
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to grow beyond `max_len` bytes.
    ///
    /// Exceeding the cap fails like an allocation failure.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of chunks received.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl WriteSink for ByteAccumulator {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        if let Some(max_len) = self.max_len {
            if self.buf.len().saturating_add(chunk.len()) > max_len {
                return Err(CodecError::out_of_memory(format!(
                    "Memory allocation failed during write: output exceeds {max_len} bytes"
                )));
            }
        }
        self.buf.write_chunk(chunk)?;
        self.chunks += 1;
        log::trace!(
            "write chunk #{}: {} bytes (total {})",
            self.chunks,
            chunk.len(),
            self.buf.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn chunks_are_appended_in_order() {
        let mut sink = ByteAccumulator::new();
        sink.write_chunk(b"ftyp").unwrap();
        sink.write_chunk(b"").unwrap();
        sink.write_chunk(b"meta").unwrap();
        assert_eq!(sink.chunk_count(), 3);
        assert_eq!(sink.len(), 8);
        assert_eq!(sink.into_bytes(), b"ftypmeta");
    }

    #[test]
    fn cap_reports_memory_allocation_error() {
        let mut sink = ByteAccumulator::new().with_max_len(6);
        sink.write_chunk(b"abcd").unwrap();
        let err = sink.write_chunk(b"efg").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryAllocationError);
        // the failed chunk is not partially applied
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn vec_is_a_sink() {
        let mut out = Vec::new();
        out.write_chunk(&[1, 2]).unwrap();
        out.write_chunk(&[3]).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }
}
