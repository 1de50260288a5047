//! Partition Storage
//!
//! Maps a partition number to a file holding an ordered list of records.
//!
//! ## Responsibilities
//! - Name partition files `<prefix>_<n>.part` inside the data directory
//! - Read a partition (missing file = empty partition, holes are legal)
//! - Fully rewrite, append to, or delete a partition file
//! - Discover the partition count from the highest numbered file

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes, BytesMut};

use crate::error::Result;
use crate::schema::Record;

/// File extension of partition files
pub const PARTITION_EXTENSION: &str = "part";

/// The set of partition files of one table
///
/// The partition count is discovered lazily by scanning the directory and is
/// cached until [`PartitionStore::reload`] is called.
pub struct PartitionStore<R> {
    /// Directory holding the partition files
    dir: PathBuf,

    /// Table file prefix
    prefix: String,

    /// Cached `max partition number + 1`
    partition_count: Option<usize>,

    _record: PhantomData<R>,
}

impl<R: Record> PartitionStore<R> {
    /// Create a store for `<dir>/<prefix>_<n>.part`; nothing is touched on disk
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            partition_count: None,
            _record: PhantomData,
        }
    }

    /// Handle bound to partition `index`; creates nothing until written
    pub fn partition(&self, index: usize) -> Partition<R> {
        Partition {
            path: self.partition_path(index),
            _record: PhantomData,
        }
    }

    /// Number of partitions (highest existing partition number + 1)
    pub fn partition_count(&mut self) -> Result<usize> {
        if let Some(count) = self.partition_count {
            return Ok(count);
        }

        let count = self.scan_partition_count()?;
        self.partition_count = Some(count);
        Ok(count)
    }

    /// Forget the cached partition count
    pub fn reload(&mut self) {
        self.partition_count = None;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn scan_partition_count(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut highest: Option<usize> = None;
        for entry in entries {
            let entry = entry?;
            let file_path = entry.path();

            if file_path.is_file() {
                if let Some(index) = self.parse_partition_index(&file_path) {
                    highest = Some(highest.map_or(index, |h| h.max(index)));
                }
            }
        }

        let count = highest.map(|h| h + 1).unwrap_or(0);
        tracing::debug!("Discovered {} partitions for '{}'", count, self.prefix);
        Ok(count)
    }

    fn partition_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.prefix, index, PARTITION_EXTENSION))
    }

    /// Parse a partition number from a file name
    /// "invoices_12.part" → Some(12)
    fn parse_partition_index(&self, path: &Path) -> Option<usize> {
        if path.extension()? != PARTITION_EXTENSION {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let index_str = name.strip_prefix(self.prefix.as_str())?.strip_prefix('_')?;
        index_str.parse().ok()
    }
}

/// Handle to one partition file
pub struct Partition<R> {
    path: PathBuf,
    _record: PhantomData<R>,
}

impl<R: Record> Partition<R> {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read every record, in file order
    ///
    /// A missing file is an empty partition, not an error.
    pub fn read(&self) -> Result<Vec<R>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buf = Bytes::from(data);
        let mut records = Vec::new();
        while buf.has_remaining() {
            records.push(R::decode(&mut buf)?);
        }

        tracing::debug!(
            "Read {} records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    /// Overwrite the partition file with `records`
    pub fn write(&self, records: &[R]) -> Result<()> {
        let encoded = Self::encode_all(records)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encoded)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        super::sync_parent(&self.path);

        tracing::debug!(
            "Wrote {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Fast path: append one record to the file and to `current`
    ///
    /// `current` must be the partition's present contents; only the new row is
    /// serialized.
    pub fn append(&self, current: &mut Vec<R>, record: R) -> Result<()> {
        self.append_all(std::slice::from_ref(&record))?;
        current.push(record);
        Ok(())
    }

    /// Append already-ordered records to the end of the file
    pub fn append_all(&self, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let encoded = Self::encode_all(records)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        super::sync_parent(&self.path);

        tracing::debug!(
            "Appended {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Remove the backing file if present
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn encode_all(records: &[R]) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        for record in records {
            record.encode(&mut buf)?;
        }
        Ok(buf)
    }
}
