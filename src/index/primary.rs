//! Primary-Key Index
//!
//! A clustered index plus a persisted, monotonically increasing id counter.
//! The index may be clustered by a different column than the primary key
//! (e.g. purchase groups clustered by invoice id).

use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::{LedgerError, Result};
use crate::schema::Record;
use crate::storage::PropertyPage;

use super::{ClusteredIndex, PrimaryKey, TableSpec};

/// Clustered index with an id allocator
pub struct PrimaryKeyIndex<R: Record> {
    index: ClusteredIndex<R>,
    key: PrimaryKey<R>,

    /// Last assigned id
    counter: i64,
}

impl<R: Record> PrimaryKeyIndex<R> {
    /// Open the index and read its counter from `page`
    ///
    /// When the counter property is absent (first run, manual recovery) the
    /// counter is reseeded from a full scan.
    pub fn open(
        dir: &Path,
        spec: TableSpec<R>,
        max_partition_size: usize,
        page: &PropertyPage,
    ) -> Result<Self> {
        let key = spec.primary_key.ok_or_else(|| {
            LedgerError::Config(format!("table '{}' has no primary key", spec.prefix))
        })?;
        let index = ClusteredIndex::open(dir, spec, max_partition_size)?;

        let mut this = Self {
            index,
            key,
            counter: 0,
        };

        match page.get_i64(key.counter_key)? {
            Some(counter) => this.counter = counter,
            None => {
                let recovered = this.recover_max_id()?;
                if recovered > 0 {
                    tracing::warn!(
                        "Counter '{}' missing, reseeded from table scan: {}",
                        key.counter_key,
                        recovered
                    );
                }
            }
        }

        Ok(this)
    }

    /// Stamp the next id on `record`, insert it, and return the id
    pub fn assign_unique_id_and_insert(&mut self, mut record: R) -> Result<i64> {
        let next = self.counter + 1;
        (self.key.set)(&mut record, next);
        self.index.insert(record)?;
        self.counter = next;
        Ok(next)
    }

    /// Insert a record that already carries its id
    ///
    /// Fails with `DuplicateKey` when the id is taken. The counter is moved
    /// forward if the id is beyond it.
    pub fn insert_with_id(&mut self, record: R) -> Result<()> {
        let get = self.key.get;
        let id = get(&record);
        if self.index.query_first(|r| get(r) == id)?.is_some() {
            return Err(LedgerError::DuplicateKey {
                table: self.index.table().to_string(),
                key: id,
            });
        }

        self.index.insert(record)?;
        self.counter = self.counter.max(id);
        Ok(())
    }

    /// Find a record by primary key (full scan)
    pub fn find(&mut self, id: i64) -> Result<Option<R>> {
        let get = self.key.get;
        self.index.query_first(|r| get(r) == id)
    }

    /// Highest primary key present in the table (0 when empty)
    pub fn max_id(&mut self) -> Result<i64> {
        let get = self.key.get;
        let mut max = 0;
        for item in self.index.iter() {
            max = max.max(get(&item?));
        }
        Ok(max)
    }

    /// Reseed the counter from the true maximum id in the table
    pub fn recover_max_id(&mut self) -> Result<i64> {
        let max = self.max_id()?;
        self.counter = max;
        Ok(max)
    }

    /// Last assigned id
    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn counter_key(&self) -> &'static str {
        self.key.counter_key
    }

    /// Copy the counter into the property page
    pub fn store_counter(&self, page: &mut PropertyPage) {
        page.set_i64(self.key.counter_key, self.counter);
    }

    pub fn id_of(&self, record: &R) -> i64 {
        (self.key.get)(record)
    }

    /// Drop memoized partitions and reread the counter from `page`
    pub fn invalidate(&mut self, page: &PropertyPage) -> Result<()> {
        self.index.invalidate()?;
        match page.get_i64(self.key.counter_key)? {
            Some(counter) => self.counter = counter,
            None => {
                self.recover_max_id()?;
            }
        }
        Ok(())
    }
}

impl<R: Record> Deref for PrimaryKeyIndex<R> {
    type Target = ClusteredIndex<R>;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

impl<R: Record> DerefMut for PrimaryKeyIndex<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.index
    }
}
