//! Index Module
//!
//! Clustered, partitioned indexes over typed records.
//!
//! ## Responsibilities
//! - Keep a table's records globally ordered by one integer sort key
//! - Spread records over size-bounded partition files
//! - Point/range queries by sort key, predicate scans, removal
//! - Optional primary-key allocation on top of a differently clustered index
//!
//! ## Layout
//! ```text
//!   partition 0     partition 1     partition 2     partition 3
//! ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐
//! │ 1  3  3  7 │  │ 8  9       │  │  (hole)    │  │ 12 15 15   │
//! └────────────┘  └────────────┘  └────────────┘  └────────────┘
//!   keys in partition i ≤ keys in partition j for i < j
//! ```
//!
//! There is no directory above the partitions: lookups scan partition bounds
//! right to left, then binary search inside one partition. That is
//! O(partitions) and assumes the partition count stays small next to the
//! partition capacity.

mod clustered;
mod cursor;
mod primary;

pub use clustered::ClusteredIndex;
pub use cursor::Cursor;
pub use primary::PrimaryKeyIndex;

/// Sort keys are plain integers (ids, or dates as day numbers)
pub type SortKey = i64;

/// Shape of one table: file prefix, clustering key, optional primary key
pub struct TableSpec<R> {
    /// Partition file prefix, also used as the table name in errors
    pub prefix: &'static str,

    /// Extracts the clustering key
    pub sort_key: fn(&R) -> SortKey,

    /// Id allocator description, for tables with their own ids
    pub primary_key: Option<PrimaryKey<R>>,
}

impl<R> Clone for TableSpec<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for TableSpec<R> {}

impl<R> std::fmt::Debug for TableSpec<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSpec")
            .field("prefix", &self.prefix)
            .field("primary_key", &self.primary_key.map(|pk| pk.counter_key))
            .finish()
    }
}

/// Primary-key column accessors plus the property that persists its counter
pub struct PrimaryKey<R> {
    /// Property page key holding the last assigned id
    pub counter_key: &'static str,
    pub get: fn(&R) -> i64,
    pub set: fn(&mut R, i64),
}

impl<R> Clone for PrimaryKey<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for PrimaryKey<R> {}
