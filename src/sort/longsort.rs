//! A streamlined external sort specialized for 64-bit signed integers (spec §4.6): no user
//! comparator, natural numeric order, and a fixed binary codec instead of generic codec
//! plumbing.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    codec::{Codec, SortReadStream, SortWriteStream},
    collection::{SortingCollection, SortingIterator},
    tempstream::TempStreamFactory,
};
use crate::Result;

/// Bound on in-RAM records for [`LongSortingCollection`], to stay within host array-size limits.
///
/// The on-disk byte order for long values is little-endian; this is an explicit implementation
/// choice, not dictated by any wire contract.
pub const MAX_RECORDS_IN_RAM: usize = ((i32::MAX as f64 / 8.0) * 0.999) as usize;

/// Fixed 8-byte little-endian codec for `i64`.
#[derive(Clone, Default)]
pub struct LongCodec;

impl Codec<i64> for LongCodec {
    fn encode(&mut self, stream: &mut SortWriteStream, record: &i64) -> Result<()> {
        stream.write_i64::<LittleEndian>(*record)?;
        Ok(())
    }

    fn decode(&mut self, stream: &mut SortReadStream) -> Result<Option<i64>> {
        match stream.read_i64::<LittleEndian>() {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A [`SortingCollection`] specialized for `i64`, with natural order and no codec plumbing
/// exposed to the caller.
pub struct LongSortingCollection(SortingCollection<i64, LongCodec>);

impl LongSortingCollection {
    /// Create a collection bounded by `max_in_ram`, clamped to [`MAX_RECORDS_IN_RAM`].
    pub fn new(factory: TempStreamFactory, max_in_ram: usize) -> Result<Self> {
        let max_in_ram = max_in_ram.min(MAX_RECORDS_IN_RAM);
        Ok(Self(SortingCollection::new(i64::cmp, LongCodec, factory, max_in_ram)?))
    }

    /// Append a value. Fails if the collection has been sealed or cleaned up.
    pub fn add(&mut self, value: i64) -> Result<()> {
        self.0.add(value)
    }

    /// Seal the collection; a no-op if already sealed.
    pub fn done_adding(&mut self) -> Result<()> {
        self.0.done_adding()
    }

    /// See [`SortingCollection::set_destructive_iteration`].
    pub fn set_destructive_iteration(&mut self, destructive: bool) {
        self.0.set_destructive_iteration(destructive);
    }

    /// Produce a cursor over all values in ascending numeric order.
    pub fn iterator(&mut self) -> Result<SortingIterator<i64, LongCodec>> {
        self.0.iterator()
    }

    /// Delete all spill files; a no-op if already cleaned up.
    pub fn cleanup(&mut self) -> Result<()> {
        self.0.cleanup()
    }
}
