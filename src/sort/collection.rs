//! An external merge-sort collection: accumulate records in RAM, spill to disk when full, and
//! produce them back out in comparator order via a k-way merge.
use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

use tempfile::NamedTempFile;

use super::{codec::Codec, tempstream::TempStreamFactory};
use crate::{Error, Result};

/// `Arc` rather than `Rc`: per spec §5, a collection built on one thread may be handed off and
/// iterated on another, so the shared comparator must be `Send + Sync` too.
type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Sealed,
    Cleaned,
}

/// Accepts an unbounded stream of records and returns them in comparator order, spilling to
/// disk under `max_in_ram`.
///
/// `T: Clone` is required so that non-destructive iteration (see
/// [`SortingCollection::set_destructive_iteration`]) can re-read the RAM buffer and spill files
/// without consuming them.
pub struct SortingCollection<T: Clone, C: Codec<T>> {
    comparator: Comparator<T>,
    codec: C,
    factory: TempStreamFactory,
    max_in_ram: usize,
    buffer: Vec<T>,
    spills: Vec<NamedTempFile>,
    state: State,
    destructive: bool,
}

impl<T: Clone, C: Codec<T>> SortingCollection<T, C> {
    /// Create a new collection. `max_in_ram` bounds the number of records buffered before a
    /// spill is triggered and must be greater than zero.
    pub fn new(
        comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        codec: C,
        factory: TempStreamFactory,
        max_in_ram: usize,
    ) -> Result<Self> {
        if max_in_ram == 0 {
            return Err(Error::InvalidMaxInRam(max_in_ram));
        }
        Ok(Self {
            comparator: Arc::new(comparator),
            codec,
            factory,
            max_in_ram,
            buffer: Vec::with_capacity(max_in_ram.min(4096)),
            spills: Vec::new(),
            state: State::Open,
            destructive: true,
        })
    }

    /// Append a record. Fails once the collection has been sealed or cleaned up.
    pub fn add(&mut self, record: T) -> Result<()> {
        match self.state {
            State::Sealed => return Err(Error::AlreadySealed),
            State::Cleaned => return Err(Error::AlreadyCleaned),
            State::Open => {}
        }
        if self.buffer.len() >= self.max_in_ram {
            self.spill_buffer()?;
        }
        self.buffer.push(record);
        Ok(())
    }

    /// Sort and serialize the current RAM buffer to a new temp file.
    fn spill_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.sort_by(|a, b| (self.comparator)(a, b));

        let (named, mut stream) = self.factory.create_writer()?;
        for record in &self.buffer {
            self.codec.encode(&mut stream, record)?;
        }
        stream.finish()?;

        self.buffer.clear();
        self.spills.push(named);
        log::debug!("sort: spilled buffer to temp file #{}", self.spills.len() - 1);
        Ok(())
    }

    /// Seal the collection: no further `add` calls are accepted. A no-op if already sealed.
    ///
    /// The RAM buffer is only flushed to a spill here if spills already exist; otherwise it is
    /// retained so `iterator()` can serve it straight from memory.
    pub fn done_adding(&mut self) -> Result<()> {
        match self.state {
            State::Cleaned => return Err(Error::AlreadyCleaned),
            State::Sealed => return Ok(()),
            State::Open => {}
        }
        if !self.spills.is_empty() && !self.buffer.is_empty() {
            self.spill_buffer()?;
        }
        self.state = State::Sealed;
        Ok(())
    }

    /// Controls whether `iterator()` may be called more than once.
    ///
    /// Destructive (the default) releases RAM and deletes spill files as they are consumed,
    /// minimizing peak resource use but precluding a second pass. Disabling it makes each
    /// `iterator()` call independent, at the cost of cloning the RAM buffer and re-opening spill
    /// files per call.
    pub fn set_destructive_iteration(&mut self, destructive: bool) {
        self.destructive = destructive;
    }

    /// Produce a cursor over all records in comparator order.
    ///
    /// Implicitly seals the collection if it is still open. May be called more than once only
    /// when destructive iteration has been disabled.
    pub fn iterator(&mut self) -> Result<SortingIterator<T, C>> {
        if self.state == State::Cleaned {
            return Err(Error::AlreadyCleaned);
        }
        if self.state == State::Open {
            self.done_adding()?;
        }

        if self.spills.is_empty() {
            self.buffer.sort_by(|a, b| (self.comparator)(a, b));
            let items =
                if self.destructive { std::mem::take(&mut self.buffer) } else { self.buffer.clone() };
            return Ok(SortingIterator { source: IterSource::Ram(items.into_iter()) });
        }

        if !self.buffer.is_empty() {
            self.spill_buffer()?;
        }

        let mut cursors = Vec::with_capacity(self.spills.len());
        if self.destructive {
            for (serial, named) in std::mem::take(&mut self.spills).into_iter().enumerate() {
                let stream = self.factory.open_reader(&named)?;
                self.push_cursor(&mut cursors, stream, serial as u64, Some(named))?;
            }
        } else {
            for (serial, named) in self.spills.iter().enumerate() {
                let stream = self.factory.open_reader(named)?;
                self.push_cursor(&mut cursors, stream, serial as u64, None)?;
            }
        }

        Ok(SortingIterator { source: IterSource::Merge(BinaryHeap::from(cursors)) })
    }

    fn push_cursor(
        &self,
        cursors: &mut Vec<SpillCursor<T, C>>,
        stream: super::codec::SortReadStream,
        serial_number: u64,
        owned_file: Option<NamedTempFile>,
    ) -> Result<()> {
        let mut cursor = SpillCursor {
            codec: self.codec.clone(),
            stream,
            peeked: None,
            serial_number,
            owned_file,
            comparator: Arc::clone(&self.comparator),
        };
        cursor.advance()?;
        if cursor.peeked.is_some() {
            cursors.push(cursor);
        }
        Ok(())
    }

    /// Delete all spill files and release the RAM buffer. Further operations fail. A no-op if
    /// already cleaned up.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.state == State::Cleaned {
            return Ok(());
        }
        self.buffer.clear();
        self.spills.clear();
        self.state = State::Cleaned;
        Ok(())
    }
}

enum IterSource<T, C: Codec<T>> {
    Ram(std::vec::IntoIter<T>),
    Merge(BinaryHeap<SpillCursor<T, C>>),
}

/// The stateful cursor returned by [`SortingCollection::iterator`].
pub struct SortingIterator<T: Clone, C: Codec<T>> {
    source: IterSource<T, C>,
}

impl<T: Clone, C: Codec<T>> Iterator for SortingIterator<T, C> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            IterSource::Ram(it) => it.next().map(Ok),
            IterSource::Merge(heap) => {
                let mut cursor = heap.pop()?;
                let record = cursor.peeked.take().expect("heap cursors always carry a peeked value");
                match cursor.advance() {
                    Ok(()) => {
                        if cursor.peeked.is_some() {
                            heap.push(cursor);
                        }
                        // else: cursor drops here, and with it any owned spill file (destructive mode).
                        Some(Ok(record))
                    }
                    Err(e) => Some(Err(e)),
                }
            }
        }
    }
}

/// A peeking cursor over one spill file, ordered for the k-way merge heap.
struct SpillCursor<T, C: Codec<T>> {
    codec: C,
    stream: super::codec::SortReadStream,
    peeked: Option<T>,
    serial_number: u64,
    /// Present only in destructive mode: dropping this deletes the spill file once the cursor
    /// is exhausted and falls out of the heap.
    owned_file: Option<NamedTempFile>,
    comparator: Comparator<T>,
}

impl<T, C: Codec<T>> SpillCursor<T, C> {
    fn advance(&mut self) -> Result<()> {
        self.peeked = self.codec.decode(&mut self.stream)?;
        Ok(())
    }
}

impl<T, C: Codec<T>> PartialEq for SpillCursor<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, C: Codec<T>> Eq for SpillCursor<T, C> {}

impl<T, C: Codec<T>> PartialOrd for SpillCursor<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: Codec<T>> Ord for SpillCursor<T, C> {
    /// Reversed so that a max-heap (`BinaryHeap`'s only mode) pops the logically smallest key
    /// first. Ties break on `serial_number`, ascending — the earliest-created spill wins.
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.peeked.as_ref().expect("heap cursors always carry a peeked value");
        let b = other.peeked.as_ref().expect("heap cursors always carry a peeked value");
        match (self.comparator)(a, b) {
            Ordering::Equal => self.serial_number.cmp(&other.serial_number),
            ord => ord,
        }
        .reverse()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sort::codec::{SortReadStream, SortWriteStream};
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use std::io::{Read, Write};

    #[derive(Clone)]
    struct I32Codec;

    impl Codec<i32> for I32Codec {
        fn encode(&mut self, stream: &mut SortWriteStream, record: &i32) -> Result<()> {
            stream.write_i32::<LittleEndian>(*record)?;
            Ok(())
        }

        fn decode(&mut self, stream: &mut SortReadStream) -> Result<Option<i32>> {
            match stream.read_i32::<LittleEndian>() {
                Ok(v) => Ok(Some(v)),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
    }

    #[derive(Clone)]
    struct StringIntCodec;

    impl Codec<(String, i32)> for StringIntCodec {
        fn encode(&mut self, stream: &mut SortWriteStream, record: &(String, i32)) -> Result<()> {
            let bytes = record.0.as_bytes();
            stream.write_u32::<LittleEndian>(bytes.len() as u32)?;
            stream.write_all(bytes)?;
            stream.write_i32::<LittleEndian>(record.1)?;
            Ok(())
        }

        fn decode(&mut self, stream: &mut SortReadStream) -> Result<Option<(String, i32)>> {
            let len = match stream.read_u32::<LittleEndian>() {
                Ok(len) => len,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf)?;
            let value = stream.read_i32::<LittleEndian>()?;
            Ok(Some((String::from_utf8(buf).expect("valid utf8"), value)))
        }
    }

    fn factory() -> TempStreamFactory {
        TempStreamFactory::new(vec![std::env::temp_dir()], false)
    }

    #[test]
    fn sorts_random_integers_with_small_ram_buffer() {
        // A small linear congruential sequence stands in for "random" without pulling in a
        // dependency for it.
        let mut state: u32 = 88172645;
        let mut input = Vec::with_capacity(5000);
        for _ in 0..5000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            input.push((state % 1_000_000) as i32);
        }

        let mut collection =
            SortingCollection::new(i32::cmp, I32Codec, factory(), 37).unwrap();
        for &v in &input {
            collection.add(v).unwrap();
        }

        let mut expected = input.clone();
        expected.sort_unstable();

        let output: Vec<i32> =
            collection.iterator().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(output, expected);
        assert_eq!(output.first(), expected.first());
        assert_eq!(output.last(), expected.last());
    }

    #[test]
    fn stable_within_spill_tie_broken_by_serial_across_spills() {
        let mut collection = SortingCollection::new(
            |a: &(String, i32), b: &(String, i32)| a.0.cmp(&b.0),
            StringIntCodec,
            factory(),
            2,
        )
        .unwrap();

        for record in [
            ("b".to_owned(), 2),
            ("a".to_owned(), 1),
            ("b".to_owned(), 1),
            ("a".to_owned(), 2),
        ] {
            collection.add(record).unwrap();
        }

        let output: Vec<(String, i32)> =
            collection.iterator().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(
            output,
            vec![
                ("a".to_owned(), 1),
                ("a".to_owned(), 2),
                ("b".to_owned(), 2),
                ("b".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn add_after_sealed_or_cleaned_fails() {
        let mut collection = SortingCollection::new(i32::cmp, I32Codec, factory(), 8).unwrap();
        collection.add(1).unwrap();
        collection.done_adding().unwrap();
        assert!(matches!(collection.add(2), Err(Error::AlreadySealed)));

        collection.cleanup().unwrap();
        assert!(matches!(collection.add(3), Err(Error::AlreadyCleaned)));
    }

    #[test]
    fn done_adding_and_cleanup_are_idempotent() {
        let mut collection = SortingCollection::new(i32::cmp, I32Codec, factory(), 8).unwrap();
        collection.add(1).unwrap();
        collection.done_adding().unwrap();
        collection.done_adding().unwrap();

        collection.cleanup().unwrap();
        collection.cleanup().unwrap();
    }

    #[test]
    fn non_destructive_iteration_can_be_re_entered() {
        let mut collection = SortingCollection::new(i32::cmp, I32Codec, factory(), 2).unwrap();
        collection.set_destructive_iteration(false);
        for v in [5, 3, 1, 4, 2] {
            collection.add(v).unwrap();
        }

        let first: Vec<i32> = collection.iterator().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let second: Vec<i32> = collection.iterator().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(first, vec![1, 2, 3, 4, 5]);
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_zero_max_in_ram() {
        assert!(matches!(
            SortingCollection::new(i32::cmp, I32Codec, factory(), 0),
            Err(Error::InvalidMaxInRam(0))
        ));
    }
}
