//! Clustered Index
//!
//! Keeps a table's records spread across size-bounded partitions, globally
//! ordered by one sort key.
//!
//! ## Insertion
//! 1. Key before the first partition's range → head of partition 0
//! 2. Key after the last partition's range → tail of the last partition
//! 3. Otherwise → binary-searched offset inside the covering partition
//! 4. A partition pushed past capacity evicts its last record into the head of
//!    the next partition, cascading rightward. Partitions are never split.
//!
//! Removal only shrinks a partition; [`ClusteredIndex::repartition`] is the
//! explicit reclamation step.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::path::Path;

use crate::error::{LedgerError, Result};
use crate::schema::Record;
use crate::storage::PartitionStore;

use super::{Cursor, SortKey, TableSpec};

/// How a partition changed since it was loaded or last flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touched {
    /// Only grew at its tail; rows from `from` on are new
    Appended { from: usize },
    /// Anything else; the whole file must be rewritten
    Rewritten,
}

/// An ordered sequence of partition files for one table
///
/// Partition reads are memoized for the lifetime of the instance (first
/// access wins). Mutations stay in memory until [`ClusteredIndex::flush`].
pub struct ClusteredIndex<R: Record> {
    /// Partition files on disk
    store: PartitionStore<R>,

    /// Table shape
    spec: TableSpec<R>,

    /// Partition capacity
    max_partition_size: usize,

    /// Partitions 0..partition_count, including holes
    partition_count: usize,

    /// Loaded partitions
    cache: HashMap<usize, Vec<R>>,

    /// Partitions changed since load
    touched: BTreeMap<usize, Touched>,
}

impl<R: Record> ClusteredIndex<R> {
    /// Open the index stored as `<dir>/<spec.prefix>_<n>.part`
    pub fn open(dir: &Path, spec: TableSpec<R>, max_partition_size: usize) -> Result<Self> {
        if max_partition_size == 0 {
            return Err(LedgerError::Config(format!(
                "table '{}': partition size must be at least 1",
                spec.prefix
            )));
        }

        let mut store = PartitionStore::new(dir, spec.prefix);
        let partition_count = store.partition_count()?;

        Ok(Self {
            store,
            spec,
            max_partition_size,
            partition_count,
            cache: HashMap::new(),
            touched: BTreeMap::new(),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Descending-order cursor over every record
    ///
    /// Each call starts a new sequence. The cursor can remove the record it
    /// yielded last.
    pub fn iter(&mut self) -> Cursor<'_, R> {
        let start = self.partition_count;
        Cursor::new(self, start)
    }

    /// Every record, in descending key order
    pub fn scan(&mut self) -> Result<Vec<R>> {
        self.iter().collect()
    }

    /// All records whose sort key equals `key`, in scan (descending) order
    pub fn query_index(&mut self, key: SortKey) -> Result<Vec<R>> {
        let runs = self.key_runs(key)?;

        let mut found = Vec::new();
        for (partition, range) in runs {
            let rows = self.load(partition)?;
            found.extend(rows[range].iter().rev().cloned());
        }
        Ok(found)
    }

    /// First record in scan order matching `predicate`
    pub fn query_first<F>(&mut self, mut predicate: F) -> Result<Option<R>>
    where
        F: FnMut(&R) -> bool,
    {
        for item in self.iter() {
            let record = item?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Number of records across all partitions
    pub fn count(&mut self) -> Result<usize> {
        let mut total = 0;
        for partition in 0..self.partition_count {
            total += self.load(partition)?.len();
        }
        Ok(total)
    }

    /// Size of each partition, holes included
    pub fn partition_sizes(&mut self) -> Result<Vec<usize>> {
        let mut sizes = Vec::with_capacity(self.partition_count);
        for partition in 0..self.partition_count {
            sizes.push(self.load(partition)?.len());
        }
        Ok(sizes)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert keeping global order; equal keys go after existing ones
    ///
    /// The record is validated against its schema first, so a constraint
    /// violation surfaces here rather than at flush.
    pub fn insert(&mut self, record: R) -> Result<()> {
        self.insert_record(record, false)
    }

    /// Insert, failing with `DuplicateKey` if the key already exists
    ///
    /// Only the incoming record is checked. Records displaced by the overflow
    /// cascade are already stored and are not re-checked.
    pub fn insert_unique(&mut self, record: R) -> Result<()> {
        self.insert_record(record, true)
    }

    /// Remove the first record in scan order matching `predicate`
    pub fn remove_first<F>(&mut self, mut predicate: F) -> Result<Option<R>>
    where
        F: FnMut(&R) -> bool,
    {
        let mut cursor = self.iter();
        while let Some(item) = cursor.next() {
            let record = item?;
            if predicate(&record) {
                cursor.remove_current()?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Remove every record whose sort key equals `key`, returned in scan order
    pub fn remove_key(&mut self, key: SortKey) -> Result<Vec<R>> {
        let runs = self.key_runs(key)?;

        let mut removed = Vec::new();
        for (partition, range) in runs {
            let rows = self.load(partition)?;
            removed.extend(rows.drain(range).rev());
            self.touch(partition, Touched::Rewritten);
        }
        Ok(removed)
    }

    /// Rewrite the table into the fewest full partitions
    ///
    /// Collects all records, sorts them by key, writes them directly to disk
    /// as `ceil(n / capacity)` partitions and deletes surplus trailing files.
    /// Pending in-memory changes are persisted as part of this.
    pub fn repartition(&mut self) -> Result<()> {
        let key_of = self.spec.sort_key;
        let old_count = self.partition_count.max(self.store.partition_count()?);

        let mut all = Vec::new();
        for partition in 0..old_count {
            all.extend(self.load(partition)?.iter().cloned());
        }
        all.sort_by_key(|record| key_of(record));

        let new_count = all.len().div_ceil(self.max_partition_size);
        for (partition, chunk) in all.chunks(self.max_partition_size).enumerate() {
            self.store.partition(partition).write(chunk)?;
        }
        for partition in new_count..old_count {
            self.store.partition(partition).delete()?;
        }

        self.cache = all
            .chunks(self.max_partition_size)
            .map(<[R]>::to_vec)
            .enumerate()
            .collect();
        self.touched.clear();
        self.partition_count = new_count;
        self.store.reload();

        tracing::info!(
            "Repartitioned '{}': {} records, {} → {} partitions",
            self.spec.prefix,
            all.len(),
            old_count,
            new_count
        );
        Ok(())
    }

    /// Persist every partition touched since open or the last flush
    pub fn flush(&mut self) -> Result<()> {
        let mut written = 0;
        loop {
            let next = self.touched.iter().next().map(|(&p, &t)| (p, t));
            let Some((partition, touched)) = next else {
                break;
            };

            let rows = self
                .cache
                .get(&partition)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let file = self.store.partition(partition);

            match touched {
                Touched::Appended { from } => file.append_all(rows.get(from..).unwrap_or(&[]))?,
                Touched::Rewritten => file.write(rows)?,
            }

            self.touched.remove(&partition);
            written += 1;
        }

        if written > 0 {
            self.store.reload();
            tracing::debug!("Flushed {} partitions of '{}'", written, self.spec.prefix);
        }
        Ok(())
    }

    /// Drop memoized partitions and unflushed changes, rediscover files
    pub fn invalidate(&mut self) -> Result<()> {
        self.cache.clear();
        self.touched.clear();
        self.store.reload();
        self.partition_count = self.store.partition_count()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> &'static str {
        self.spec.prefix
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// True when there are unflushed changes
    pub fn is_dirty(&self) -> bool {
        !self.touched.is_empty()
    }

    // =========================================================================
    // Crate-internal Helpers
    // =========================================================================

    /// Load (or fetch memoized) partition contents
    pub(super) fn load(&mut self, partition: usize) -> Result<&mut Vec<R>> {
        match self.cache.entry(partition) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let rows = self.store.partition(partition).read()?;
                Ok(entry.insert(rows))
            }
        }
    }

    /// Remove the record at `row` of `partition`
    pub(super) fn remove_at(&mut self, partition: usize, row: usize) -> Result<R> {
        let table = self.spec.prefix;
        let rows = self.load(partition)?;
        if row >= rows.len() {
            return Err(LedgerError::corrupted(format!(
                "'{}': row {} of partition {} vanished during iteration",
                table, row, partition
            )));
        }
        let record = rows.remove(row);
        self.touch(partition, Touched::Rewritten);
        Ok(record)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn insert_record(&mut self, record: R, unique: bool) -> Result<()> {
        record.validate()?;

        let key_of = self.spec.sort_key;
        let table = self.spec.prefix;
        let key = key_of(&record);

        let (partition, offset) = match self.key_bounds()? {
            None => (0, 0),
            Some((first, _)) if key < first => (0, 0),
            Some((_, last)) if key > last => {
                let partition = self.partition_count.saturating_sub(1);
                let len = self.load(partition)?.len();
                (partition, len)
            }
            Some(_) => {
                let partition = self.locate_partition(key)?.ok_or_else(|| {
                    LedgerError::corrupted(format!(
                        "'{}': no partition covers key {} inside the table's range",
                        table, key
                    ))
                })?;
                let rows = self.load(partition)?;
                let offset = rows.partition_point(|r| key_of(r) <= key);
                if unique && offset > 0 && key_of(&rows[offset - 1]) == key {
                    return Err(LedgerError::DuplicateKey {
                        table: table.to_string(),
                        key,
                    });
                }
                (partition, offset)
            }
        };

        self.cascade_insert(partition, offset, record)
    }

    /// Insert at `offset` of `partition`, pushing overflow into the next
    /// partition's head until every partition fits
    fn cascade_insert(&mut self, mut partition: usize, mut offset: usize, mut record: R) -> Result<()> {
        let max = self.max_partition_size;

        loop {
            if partition >= self.partition_count {
                self.partition_count = partition + 1;
            }

            let rows = self.load(partition)?;
            let at_tail = offset >= rows.len();
            rows.insert(offset.min(rows.len()), record);

            if rows.len() <= max {
                let touched = if at_tail {
                    Touched::Appended { from: rows.len() - 1 }
                } else {
                    Touched::Rewritten
                };
                self.touch(partition, touched);
                return Ok(());
            }

            let evicted = rows.pop();
            self.touch(partition, Touched::Rewritten);
            match evicted {
                Some(evicted) => record = evicted,
                None => return Ok(()),
            }

            tracing::trace!(
                "'{}': partition {} full, cascading tail into {}",
                self.spec.prefix,
                partition,
                partition + 1
            );
            partition += 1;
            offset = 0;
        }
    }

    /// First key of the first non-empty partition and last key of the last
    fn key_bounds(&mut self) -> Result<Option<(SortKey, SortKey)>> {
        let key_of = self.spec.sort_key;

        let mut first = None;
        for partition in 0..self.partition_count {
            if let Some(record) = self.load(partition)?.first() {
                first = Some(key_of(record));
                break;
            }
        }
        let Some(first) = first else {
            return Ok(None);
        };

        for partition in (0..self.partition_count).rev() {
            if let Some(record) = self.load(partition)?.last() {
                return Ok(Some((first, key_of(record))));
            }
        }
        Ok(None)
    }

    /// Right-to-left scan for the last non-empty partition starting at or
    /// before `key`
    fn locate_partition(&mut self, key: SortKey) -> Result<Option<usize>> {
        let key_of = self.spec.sort_key;

        for partition in (0..self.partition_count).rev() {
            if let Some(record) = self.load(partition)?.first() {
                if key_of(record) <= key {
                    return Ok(Some(partition));
                }
            }
        }
        Ok(None)
    }

    /// Row ranges holding `key`, from the rightmost partition leftward
    ///
    /// A run of equal keys can spill over a partition boundary; the walk
    /// continues into earlier partitions while the run reaches their tail.
    fn key_runs(&mut self, key: SortKey) -> Result<Vec<(usize, Range<usize>)>> {
        let key_of = self.spec.sort_key;
        let mut runs = Vec::new();

        let Some(start) = self.locate_partition(key)? else {
            return Ok(runs);
        };

        let mut next = Some(start);
        while let Some(partition) = next {
            next = partition.checked_sub(1);

            let rows = self.load(partition)?;
            if rows.is_empty() {
                continue;
            }

            let lo = rows.partition_point(|r| key_of(r) < key);
            let hi = rows.partition_point(|r| key_of(r) <= key);
            if lo == hi {
                break;
            }

            runs.push((partition, lo..hi));
            if lo > 0 {
                break;
            }
        }
        Ok(runs)
    }

    fn touch(&mut self, partition: usize, touched: Touched) {
        let entry = self.touched.entry(partition).or_insert(touched);
        if touched == Touched::Rewritten {
            *entry = Touched::Rewritten;
        }
    }
}
