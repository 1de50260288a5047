//! Index Cursor
//!
//! Lazy descending scan over a clustered index: partitions from last to
//! first, each partition from its last row to its first.

use crate::error::{LedgerError, Result};
use crate::schema::Record;

use super::ClusteredIndex;

/// Descending iterator over all records of a [`ClusteredIndex`]
///
/// Yields owned copies. [`Cursor::remove_current`] deletes the record
/// yielded last; because the scan runs backwards, rows not yet visited keep
/// their positions.
pub struct Cursor<'a, R: Record> {
    index: &'a mut ClusteredIndex<R>,

    /// Partition being walked
    partition: usize,

    /// Rows of `partition` not yet yielded
    remaining: usize,

    /// Position of the last yielded record
    last: Option<(usize, usize)>,
}

impl<'a, R: Record> Cursor<'a, R> {
    pub(super) fn new(index: &'a mut ClusteredIndex<R>, partition_count: usize) -> Self {
        Self {
            index,
            partition: partition_count,
            remaining: 0,
            last: None,
        }
    }

    /// Remove the record returned by the previous `next()`
    ///
    /// Returns `None` when nothing was yielded yet or it was already removed.
    pub fn remove_current(&mut self) -> Result<Option<R>> {
        match self.last.take() {
            Some((partition, row)) => self.index.remove_at(partition, row).map(Some),
            None => Ok(None),
        }
    }
}

impl<'a, R: Record> Iterator for Cursor<'a, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining > 0 {
                self.remaining -= 1;
                let (partition, row) = (self.partition, self.remaining);

                let rows = match self.index.load(partition) {
                    Ok(rows) => rows,
                    Err(e) => return Some(Err(e)),
                };
                let Some(record) = rows.get(row).cloned() else {
                    return Some(Err(LedgerError::corrupted(format!(
                        "partition {} shrank under an open cursor",
                        partition
                    ))));
                };

                self.last = Some((partition, row));
                return Some(Ok(record));
            }

            self.last = None;
            if self.partition == 0 {
                return None;
            }

            // Move to the previous partition (holes yield nothing)
            self.partition -= 1;
            match self.index.load(self.partition) {
                Ok(rows) => self.remaining = rows.len(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
