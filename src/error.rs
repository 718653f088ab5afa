//! Crate-wide error type.
//!
//! One variant per error kind in the design's error-handling section: truncation/format,
//! invalid-argument, lifecycle, I/O, codec, and CRC.
use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Compressed block size ({0}) exceeds max allowed: ({1})")]
    BlockSizeExceeded(usize, usize),

    #[error("Invalid compression level: {0}")]
    CompressionLevel(u8),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Invalid checksum, found {found}, expected {expected}")]
    InvalidChecksum { found: u32, expected: u32 },

    #[error("Invalid block header: {0}")]
    InvalidHeader(&'static str),

    #[error("Truncated BGZF block: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("LibDeflater compression error: {0:?}")]
    LibDeflaterCompress(libdeflater::CompressionError),

    #[error(transparent)]
    LibDeflaterDecompress(#[from] libdeflater::DecompressionError),

    #[error("Block address {0} exceeds the 48-bit virtual file pointer range")]
    InvalidBlockAddress(u64),

    #[error("Seek requested {requested} bytes into a block of length {block_len}")]
    InvalidBlockOffset { requested: usize, block_len: usize },

    #[error("max_in_ram must be greater than zero (and at most {0} for the long-sort specialization)")]
    InvalidMaxInRam(usize),

    #[error("sorting collection has already been sealed; no further records may be added")]
    AlreadySealed,

    #[error("sorting collection has already been cleaned up; no further operations are permitted")]
    AlreadyCleaned,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("HTTP range request to {url} failed with status {status}")]
    Http { url: String, status: u16 },

    #[error("background writer thread panicked: {0}")]
    WorkerPanicked(String),
}
