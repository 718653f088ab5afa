//! Virtual file pointers: a 64-bit composite identifier of a byte inside a BGZF stream.
//!
//! The high 48 bits are the compressed byte offset of the BGZF block (the "block address");
//! the low 16 bits are the byte offset inside that block's inflated payload. Pure, stateless
//! arithmetic over a `u64` — see spec §4.3.
use std::fmt;

use crate::error::{Error, Result};

/// Number of bits given to the in-block offset.
const OFFSET_BITS: u32 = 16;

/// Largest block address representable in 48 bits.
pub const MAX_BLOCK_ADDRESS: u64 = (1u64 << 48) - 1;

/// A virtual file pointer: `(block_address, block_offset)` packed into a `u64`.
///
/// Ordering is the natural unsigned order on the packed `u64`, which is equivalent to
/// lexicographic order on `(block_address, block_offset)` since the offset occupies the low
/// 16 bits exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualFilePointer(u64);

impl VirtualFilePointer {
    /// Construct a pointer from a block address and an in-block offset.
    ///
    /// Fails if `block_address` does not fit in 48 bits.
    pub fn make(block_address: u64, block_offset: u16) -> Result<Self> {
        if block_address > MAX_BLOCK_ADDRESS {
            return Err(Error::InvalidBlockAddress(block_address));
        }
        Ok(Self((block_address << OFFSET_BITS) | u64::from(block_offset)))
    }

    /// The raw packed representation.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct a pointer from its raw packed representation.
    ///
    /// Every `u64` is a valid raw virtual file pointer: the top 16 bits of a `u64` are always
    /// zero for any legally-constructed pointer (48 + 16 = 64), so there is no range to check.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The compressed byte offset of the block containing this pointer.
    pub fn block_address(self) -> u64 {
        self.0 >> OFFSET_BITS
    }

    /// The byte offset inside that block's inflated payload.
    pub fn block_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Compare two pointers as unsigned 64-bit integers.
    ///
    /// Equivalent to `self.cmp(&other)`, named to mirror the spec's `compare(a, b)` operation.
    pub fn compare(self, other: Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }

    /// Whether `self` and `other` live in the same block or in adjacent blocks.
    pub fn same_or_adjacent_blocks(self, other: Self) -> bool {
        let a = self.block_address();
        let b = other.block_address();
        a.abs_diff(b) <= 1
    }
}

impl fmt::Display for VirtualFilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.block_address(), self.block_offset())
    }
}
