//! An external merge-sort engine: accumulate records up to a RAM threshold, spill sorted runs to
//! disk beyond it, and merge everything back into comparator order on iteration.
mod async_writer;
mod codec;
mod collection;
mod longsort;
mod tempstream;

pub use async_writer::{AsyncWriter, SynchronousSink};
pub use codec::{Codec, SortReadStream, SortWriteStream};
pub use collection::{SortingCollection, SortingIterator};
pub use longsort::{LongCodec, LongSortingCollection, MAX_RECORDS_IN_RAM};
pub use tempstream::TempStreamFactory;
