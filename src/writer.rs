//! A BGZF writer implementation.
use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use bytes::BytesMut;

use crate::{
    VirtualFilePointer, BGZF_BLOCK_SIZE, BGZF_EOF, BUFSIZE, CompressionLevel, Compressor,
    MAX_BGZF_BLOCK_SIZE,
};

/// A BGZF writer.
///
/// # Example
///
/// ```rust
/// use bgzf_sort::{CompressionLevel, Writer};
/// use std::error::Error;
/// use std::io::Write;
///
/// fn main() -> Result<(), Box<dyn Error>> {
///     // Write compressed data
///     let mut destination = vec![];
///     let mut writer = Writer::new(&mut destination, 2.try_into()?);
///     let input = &[b'A'; 100];
///     writer.write_all(input)?;
///     writer.close()?;
///     drop(writer);
///
///     assert!(destination.len() < input.len());
///     Ok(())
/// }
/// ```
pub struct Writer<W>
where
    W: Write,
{
    /// The internal buffer to use
    uncompressed_buffer: BytesMut,
    /// The buffer to reuse for compressed bytes
    compressed_buffer: Vec<u8>,
    /// The size of the blocks to create
    blocksize: usize,
    /// The compressor to reuse
    compressor: Compressor,
    /// The inner writer
    writer: W,
    /// Compressed-stream offset of the next byte this writer will emit.
    compressed_offset: u64,
    /// Set once `close` has written the terminator block, so a second `close` (or the `Drop`
    /// impl running after an explicit `close`) is a no-op rather than a second terminator.
    closed: bool,
}

impl<W> Writer<W>
where
    W: Write,
{
    /// Create a new [`Writer`]
    pub fn new(writer: W, compression_level: CompressionLevel) -> Self {
        Self::with_capacity(writer, compression_level, BGZF_BLOCK_SIZE)
    }

    /// Create a writer with a set capacity.
    ///
    /// By default the capacity is [`crate::BUFSIZE`]. The capacity must be less than
    /// [`crate::BGZF_BLOCK_SIZE`].
    pub fn with_capacity(writer: W, compression_level: CompressionLevel, blocksize: usize) -> Self {
        assert!(blocksize <= BGZF_BLOCK_SIZE);
        let compressor = Compressor::new(compression_level);
        Self {
            uncompressed_buffer: BytesMut::with_capacity(BUFSIZE),
            compressed_buffer: Vec::with_capacity(BUFSIZE),
            blocksize,
            compressor,
            writer,
            compressed_offset: 0,
            closed: false,
        }
    }

    /// The virtual file pointer at which the next written byte will land.
    ///
    /// Valid before `close`; the reported block address is the address the block will be
    /// written at once it is flushed, since blocks are emitted strictly in order.
    pub fn file_pointer(&self) -> VirtualFilePointer {
        VirtualFilePointer::make(self.compressed_offset, self.uncompressed_buffer.len() as u16)
            .expect("block address overflowed 48 bits")
    }

    /// Compress and emit one block's worth of buffered bytes, of at most `max_chunk` bytes.
    fn emit_one_block(&mut self, max_chunk: usize) -> io::Result<()> {
        let n = std::cmp::min(self.uncompressed_buffer.len(), max_chunk);
        let chunk = self.uncompressed_buffer.split_to(n).freeze();
        self.compressor
            .compress(&chunk[..], &mut self.compressed_buffer)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.writer.write_all(&self.compressed_buffer)?;
        self.compressed_offset += self.compressed_buffer.len() as u64;
        self.compressed_buffer.clear();
        Ok(())
    }

    /// Flush any buffered data as BGZF blocks, without writing the terminator.
    ///
    /// Safe to call repeatedly (including after `close`, where the buffer is always empty).
    fn flush_blocks(&mut self) -> io::Result<()> {
        while !self.uncompressed_buffer.is_empty() {
            self.emit_one_block(MAX_BGZF_BLOCK_SIZE)?;
        }
        self.writer.flush()
    }

    /// Flush buffered bytes and write the terminator block exactly once.
    ///
    /// Idempotent: calling `close` again after it has already succeeded is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_blocks()?;
        self.writer.write_all(BGZF_EOF)?;
        self.compressed_offset += BGZF_EOF.len() as u64;
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl Writer<File> {
    /// Create a BGZF writer from a [`Path`].
    pub fn from_path<P>(path: P, compression_level: CompressionLevel) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        File::create(path).map(|f| Self::new(f, compression_level))
    }
}

impl<W> Write for Writer<W>
where
    W: Write,
{
    /// Write a buffer into this writer, returning how many bytes were written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.uncompressed_buffer.extend_from_slice(buf);
        while self.uncompressed_buffer.len() >= self.blocksize {
            self.emit_one_block(self.blocksize)?;
        }
        Ok(buf.len())
    }

    /// Flush this output stream, emitting any buffered bytes as a final partial block.
    ///
    /// Unlike `close`, this never writes the terminator block, so the stream remains open for
    /// further writes afterwards.
    fn flush(&mut self) -> io::Result<()> {
        self.flush_blocks()
    }
}

impl<W> Drop for Writer<W>
where
    W: Write,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("bgzf: error closing writer during drop: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Reader;
    use std::io::Read;

    #[test]
    fn close_is_idempotent_and_writes_terminator_once() {
        let mut out = Vec::new();
        let mut writer = Writer::new(&mut out, CompressionLevel::new(6).unwrap());
        writer.write_all(b"hello").unwrap();
        writer.close().unwrap();
        let len_after_first_close = out.len();
        writer.close().unwrap();
        assert_eq!(out.len(), len_after_first_close);
        drop(writer);
        assert_eq!(out.len(), len_after_first_close);

        assert_eq!(&out[out.len() - BGZF_EOF.len()..], BGZF_EOF);
    }

    #[test]
    fn flush_does_not_append_terminator() {
        let mut out = Vec::new();
        let mut writer = Writer::new(&mut out, CompressionLevel::new(6).unwrap());
        writer.write_all(b"alpha").unwrap();
        writer.flush().unwrap();
        assert_ne!(out[out.len() - BGZF_EOF.len()..], *BGZF_EOF);

        writer.write_all(b"beta").unwrap();
        writer.close().unwrap();

        let mut reader = Reader::new(out.as_slice());
        let mut roundtrip = Vec::new();
        reader.read_to_end(&mut roundtrip).unwrap();
        assert_eq!(roundtrip, b"alphabeta");
    }

    #[test]
    fn file_pointer_advances_with_buffered_bytes() {
        let mut out = Vec::new();
        let mut writer = Writer::new(&mut out, CompressionLevel::new(6).unwrap());
        let start = writer.file_pointer();
        assert_eq!(start.block_address(), 0);
        assert_eq!(start.block_offset(), 0);

        writer.write_all(b"some bytes").unwrap();
        let after_write = writer.file_pointer();
        assert_eq!(after_write.block_address(), 0);
        assert_eq!(after_write.block_offset(), 10);

        writer.close().unwrap();
    }
}
