//! Encoding of sorted records to and from temporary-file streams.
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

use crate::Result;

/// A clonable encoder/decoder for one record type.
///
/// The sorter clones a `Codec` once per spill cursor during merge, so each cursor gets an
/// independent state machine rather than sharing a reader; implementations should treat `clone`
/// as "give me a fresh encoder/decoder configured the same way", not "share my buffers".
pub trait Codec<T>: Clone {
    /// Append `record` to `stream`.
    fn encode(&mut self, stream: &mut SortWriteStream, record: &T) -> Result<()>;

    /// Read the next record from `stream`, or `None` at end of stream.
    fn decode(&mut self, stream: &mut SortReadStream) -> Result<Option<T>>;
}

/// The write side of a temp-stream, with or without the block compressor applied.
pub enum SortWriteStream {
    Raw(BufWriter<File>),
    Compressed(DeflateEncoder<BufWriter<File>>),
}

impl Write for SortWriteStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Raw(w) => w.write(buf),
            Self::Compressed(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Raw(w) => w.flush(),
            Self::Compressed(w) => w.flush(),
        }
    }
}

impl SortWriteStream {
    /// Finish the underlying compressor (if any) and flush the file.
    ///
    /// Must be called before the underlying `NamedTempFile` is handed off for reading; a
    /// `DeflateEncoder` buffers internally and only emits its final bytes on `finish`.
    pub fn finish(self) -> Result<()> {
        match self {
            Self::Raw(mut w) => {
                w.flush()?;
                Ok(())
            }
            Self::Compressed(w) => {
                w.finish()?.flush()?;
                Ok(())
            }
        }
    }
}

/// The read side of a temp-stream, with or without the block decompressor applied.
pub enum SortReadStream {
    Raw(BufReader<File>),
    Compressed(DeflateDecoder<BufReader<File>>),
}

impl Read for SortReadStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Raw(r) => r.read(buf),
            Self::Compressed(r) => r.read(buf),
        }
    }
}

impl SortWriteStream {
    pub(crate) fn new(file: File, compressed: bool) -> Self {
        if compressed {
            Self::Compressed(DeflateEncoder::new(BufWriter::new(file), Compression::default()))
        } else {
            Self::Raw(BufWriter::new(file))
        }
    }
}

impl SortReadStream {
    pub(crate) fn new(file: File, compressed: bool) -> Self {
        if compressed {
            Self::Compressed(DeflateDecoder::new(BufReader::new(file)))
        } else {
            Self::Raw(BufReader::new(file))
        }
    }
}
