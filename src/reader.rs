//! A Reader for BGZF compressed data, with virtual-file-pointer seek support.
use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    check_header, get_block_size, get_footer_values, strip_footer, Decompressor, Error, Result,
    SeekableByteSource, VirtualFilePointer, BGZF_EOF, BGZF_HEADER_SIZE, BGZF_MAGIC_BYTE_A,
    BGZF_MAGIC_BYTE_B,
};

/// Outcome of [`check_termination`]: classifies how a BGZF file's tail looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The file ends with the 28-byte empty BGZF terminator block.
    HasTerminatorBlock,
    /// The file has no terminator block, but every block (including the last) is well-formed
    /// and the file ends exactly on a block boundary.
    HasHealthyLastBlock,
    /// The file is corrupt or truncated: a block header failed validation, or the file ends
    /// mid-block.
    Defective,
}

/// Peek the first 18 bytes of `stream` and validate the gzip magic plus the BGZF extra subfield
/// identifiers. Consumes the bytes it reads, so callers working from a reusable handle should
/// rewind afterwards.
pub fn is_valid_file<S: Read>(mut stream: S) -> Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let read = try_read_fully(&mut stream, &mut header)?;
    if read < BGZF_HEADER_SIZE {
        return Ok(false);
    }
    Ok(header[0] == BGZF_MAGIC_BYTE_A && header[1] == BGZF_MAGIC_BYTE_B && check_header(&header).is_ok())
}

/// Classify the tail of a BGZF file: does it end with the terminator block, a healthy
/// non-terminated last block, or is it corrupt?
pub fn check_termination<S: Read + Seek>(mut stream: S) -> Result<Termination> {
    stream.seek(SeekFrom::Start(0))?;
    let mut saw_any_block = false;

    loop {
        let mut header = [0u8; BGZF_HEADER_SIZE];
        let header_bytes = try_read_fully(&mut stream, &mut header)?;
        if header_bytes == 0 {
            return Ok(if saw_any_block { Termination::HasHealthyLastBlock } else { Termination::Defective });
        }
        if header_bytes < BGZF_HEADER_SIZE
            || header[0] != BGZF_MAGIC_BYTE_A
            || header[1] != BGZF_MAGIC_BYTE_B
            || check_header(&header).is_err()
        {
            return Ok(Termination::Defective);
        }

        let block_size = get_block_size(&header);
        let mut body = vec![0u8; block_size - BGZF_HEADER_SIZE];
        let body_bytes = try_read_fully(&mut stream, &mut body)?;
        if body_bytes != body.len() {
            return Ok(Termination::Defective);
        }
        saw_any_block = true;

        let check = get_footer_values(&body);
        let is_terminator = block_size == BGZF_EOF.len() && check.amount == 0 && check.sum == 0;
        if is_terminator {
            let mut probe = [0u8; 1];
            let trailing = try_read_fully(&mut stream, &mut probe)?;
            return Ok(if trailing == 0 { Termination::HasTerminatorBlock } else { Termination::Defective });
        }
    }
}

/// A BGZF reader.
///
/// # Example
///
/// ```rust
/// use bgzf_sort::{Reader, Compressor, CompressionLevel};
/// use std::error::Error;
/// use std::io::Read;
///
/// fn main() -> Result<(), Box<dyn Error>> {
///     // Create compressed data
///     let mut compressor = Compressor::new(CompressionLevel::new(2)?);
///     let input = &[b'A'; 100];
///     let mut compressed_data = vec![];
///     compressor.compress(input, &mut compressed_data)?;
///
///     let mut reader = Reader::new(compressed_data.as_slice());
///     let mut decompressed_data = vec![];
///     let _bytes_read = reader.read_to_end(&mut decompressed_data)?;
///     assert_eq!(decompressed_data, input);
///     Ok(())
/// }
/// ```
pub struct Reader<R> {
    reader: R,
    decompressor: Decompressor,
    decompressed: Vec<u8>,
    position_in_block: usize,
    /// Compressed-stream offset of the block currently loaded into `decompressed`.
    block_address: u64,
    /// Total compressed size (header + payload + footer) of that block.
    block_total_size: u64,
    /// Running compressed-stream offset; for non-seekable sources this is only ever advanced,
    /// never reset, and is how `file_pointer` and block addressing work without needing `Seek`.
    compressed_offset: u64,
    /// Whether a block has ever been successfully loaded (distinguishes "nothing read yet" from
    /// "loaded block 0" when deciding whether a `seek` can reuse the current block).
    loaded: bool,
    /// A single byte of lookahead used by `read_line` to implement CRLF handling without losing
    /// a byte that turned out not to be part of a line terminator.
    pending: Option<u8>,
    check_crc: bool,
}

impl<R> Reader<R>
where
    R: Read,
{
    /// Create a new reader with CRC verification enabled.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decompressor: Decompressor::new(),
            decompressed: Vec::new(),
            position_in_block: 0,
            block_address: 0,
            block_total_size: 0,
            compressed_offset: 0,
            loaded: false,
            pending: None,
            check_crc: true,
        }
    }

    /// Toggle CRC32 verification of each block's inflated payload (§7 error kind "CRC error").
    pub fn set_check_crc(&mut self, check_crc: bool) {
        self.check_crc = check_crc;
    }

    /// Bytes remaining in the currently loaded uncompressed block, loading the next block on
    /// demand if the current one is exhausted. Returns `0` at true EOF.
    pub fn available(&mut self) -> Result<usize> {
        if self.position_in_block >= self.decompressed.len() {
            self.load_next_block()?;
        }
        Ok(self.decompressed.len().saturating_sub(self.position_in_block))
    }

    /// The virtual file pointer at the current read position.
    ///
    /// When the current offset equals the block length, this reports `(next_block_address, 0)`
    /// rather than `(current_block_address, length)`, matching the invariant in spec §3.
    ///
    /// `read_line`'s CRLF lookahead stashes one over-read byte in `pending` and re-delivers it on
    /// the next `read`; `position_in_block` already counts that byte as consumed, so the logical
    /// position reported here backs up by one to point at the stashed byte instead of past it.
    pub fn file_pointer(&self) -> VirtualFilePointer {
        if self.pending.is_some() {
            let offset = self.position_in_block - 1;
            return VirtualFilePointer::make(self.block_address, offset as u16)
                .expect("block address overflowed 48 bits");
        }
        if self.position_in_block >= self.decompressed.len() {
            VirtualFilePointer::make(self.block_address + self.block_total_size, 0)
                .expect("block address overflowed 48 bits")
        } else {
            VirtualFilePointer::make(self.block_address, self.position_in_block as u16)
                .expect("block address overflowed 48 bits")
        }
    }

    /// Return the next line, terminated by LF, CR, or CRLF, with the terminator stripped.
    /// Returns `None` at EOF with no partial line pending.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            match self.read_byte()? {
                None => {
                    return Ok(if line.is_empty() { None } else { Some(line) });
                }
                Some(b'\n') => return Ok(Some(line)),
                Some(b'\r') => {
                    match self.read_byte()? {
                        Some(b'\n') | None => {}
                        Some(other) => self.pending = Some(other),
                    }
                    return Ok(Some(line));
                }
                Some(b) => line.push(b),
            }
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        let n = Read::read(self, &mut buf)?;
        Ok(if n == 0 { None } else { Some(buf[0]) })
    }

    /// Load the next BGZF block from the underlying reader.
    ///
    /// Returns the number of compressed bytes consumed, or `0` at a clean EOF (no bytes
    /// available where a block header was expected).
    fn load_next_block(&mut self) -> Result<usize> {
        let mut header = [0u8; BGZF_HEADER_SIZE];
        if !read_exact_or_eof(&mut self.reader, &mut header)? {
            self.decompressed.clear();
            self.position_in_block = 0;
            return Ok(0);
        }
        check_header(&header)?;

        let block_size = get_block_size(&header);
        let mut body = vec![0u8; block_size - BGZF_HEADER_SIZE];
        if !read_exact_or_eof(&mut self.reader, &mut body)? {
            return Err(Error::Truncated { expected: body.len(), found: 0 });
        }

        let check = get_footer_values(&body);
        self.decompressed.clear();
        self.decompressed.resize(check.amount as usize, 0);
        self.decompressor.decompress(strip_footer(&body), &mut self.decompressed, check, self.check_crc)?;

        self.block_address = self.compressed_offset;
        self.block_total_size = block_size as u64;
        self.compressed_offset += block_size as u64;
        self.position_in_block = 0;
        self.loaded = true;
        log::debug!(
            "bgzf: loaded block at {} (compressed {}B, uncompressed {}B)",
            self.block_address,
            block_size,
            self.decompressed.len()
        );
        Ok(block_size)
    }
}

impl<R> Reader<R>
where
    R: SeekableByteSource,
{
    /// Position the stream at the given virtual file pointer.
    ///
    /// If the requested block is already loaded, the underlying source is not touched; only the
    /// in-block offset changes. Otherwise the source repositions to the block's compressed
    /// offset and loads it fresh.
    pub fn seek(&mut self, vfp: VirtualFilePointer) -> Result<()> {
        let target_block = vfp.block_address();

        if !(self.loaded && self.block_address == target_block) {
            self.reader.seek_to(target_block)?;
            self.compressed_offset = target_block;
            self.pending = None;

            if self.load_next_block()? == 0 {
                self.block_address = target_block;
                self.block_total_size = 0;
                self.decompressed.clear();
                self.position_in_block = 0;
                self.loaded = true;
                return if vfp.block_offset() == 0 {
                    Ok(())
                } else {
                    Err(Error::InvalidBlockOffset { requested: vfp.block_offset() as usize, block_len: 0 })
                };
            }
        }

        let offset = vfp.block_offset() as usize;
        if offset > self.decompressed.len() {
            return Err(Error::InvalidBlockOffset { requested: offset, block_len: self.decompressed.len() });
        }
        self.position_in_block = offset;
        self.pending = None;
        Ok(())
    }
}

impl<R> Read for Reader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.pending.take() {
            buf[0] = b;
            return Ok(1);
        }

        let available = self.available().map_err(to_io_error)?;
        if available == 0 {
            return Ok(0);
        }
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.decompressed[self.position_in_block..self.position_in_block + n]);
        self.position_in_block += n;
        Ok(n)
    }
}

fn to_io_error(e: Error) -> io::Error {
    match e {
        Error::Io(io_err) => io_err,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Read exactly `buf.len()` bytes, or report whether zero bytes were available at all.
///
/// `Ok(true)`: `buf` was filled completely. `Ok(false)`: zero bytes were read (clean EOF).
/// `Err(Truncated)`: between 1 and `buf.len() - 1` bytes were read before the source ran dry.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let total = try_read_fully(reader, buf)?;
    if total == 0 {
        Ok(false)
    } else if total == buf.len() {
        Ok(true)
    } else {
        Err(Error::Truncated { expected: buf.len(), found: total })
    }
}

/// Read as many bytes as are available, up to `buf.len()`, looping over short reads.
fn try_read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}
