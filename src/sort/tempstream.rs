//! Chooses a temp directory and hands out matched writer/reader stream pairs.
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::codec::{SortReadStream, SortWriteStream};
use crate::Result;

/// Produces spill-file streams for [`super::SortingCollection`].
///
/// Holds the configured candidate temp-directory list and a compression flag; every stream it
/// opens for reading was written by a stream it opened for writing with the same flag, which is
/// the "reader and writer must be produced by the same factory configuration" contract a spill
/// file relies on.
#[derive(Clone)]
pub struct TempStreamFactory {
    directories: Vec<PathBuf>,
    compress: bool,
}

impl TempStreamFactory {
    /// Create a factory over the given candidate directories, in preference order.
    ///
    /// # Panics
    /// Panics if `directories` is empty: there must always be at least a fallback directory.
    pub fn new(directories: Vec<PathBuf>, compress: bool) -> Self {
        assert!(!directories.is_empty(), "at least one temp directory is required");
        Self { directories, compress }
    }

    /// Factory rooted at the system temp directory, with compression enabled.
    pub fn system_default() -> Self {
        Self::new(vec![std::env::temp_dir()], true)
    }

    /// First directory that exists and is writable, else the last configured directory.
    fn choose_directory(&self) -> &Path {
        for dir in &self.directories {
            if let Ok(meta) = dir.metadata() {
                if meta.is_dir() && !meta.permissions().readonly() {
                    return dir;
                }
            }
        }
        self.directories.last().expect("at least one temp directory is required")
    }

    /// Create a new spill file and its write stream.
    ///
    /// The returned `NamedTempFile` must be kept alive for the lifetime of the spill: dropping
    /// it deletes the underlying file.
    pub fn create_writer(&self) -> Result<(NamedTempFile, SortWriteStream)> {
        let dir = self.choose_directory();
        let named = NamedTempFile::new_in(dir)?;
        let handle = named.reopen()?;
        Ok((named, SortWriteStream::new(handle, self.compress)))
    }

    /// Open an independent read stream over an existing spill file.
    ///
    /// Each call returns a fresh file handle and position, so multiple cursors may read distinct
    /// streams over the same `NamedTempFile` concurrently.
    pub fn open_reader(&self, named: &NamedTempFile) -> Result<SortReadStream> {
        let handle = named.reopen()?;
        Ok(SortReadStream::new(handle, self.compress))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn falls_back_to_last_directory_when_earlier_ones_are_missing() {
        let missing = PathBuf::from("/this/path/should/not/exist/hopefully");
        let fallback = tempfile::tempdir().unwrap();
        let factory = TempStreamFactory::new(vec![missing, fallback.path().to_path_buf()], false);
        assert_eq!(factory.choose_directory(), fallback.path());
    }

    #[test]
    fn writer_and_reader_round_trip_bytes() {
        use std::io::{Read, Write};

        let dir = tempfile::tempdir().unwrap();
        let factory = TempStreamFactory::new(vec![dir.path().to_path_buf()], true);

        let (named, mut writer) = factory.create_writer().unwrap();
        writer.write_all(b"spilled bytes").unwrap();
        writer.finish().unwrap();

        let mut reader = factory.open_reader(&named).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"spilled bytes");
    }
}
