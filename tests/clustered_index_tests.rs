//! Tests for ClusteredIndex
//!
//! These tests verify:
//! - Global descending scan order and non-overlapping partition ranges
//! - Partition capacity under cascade re-insertion
//! - Key range queries, including duplicate runs across partitions
//! - Unique inserts, removal, repartition and flush/reopen
//! - Holes in the partition sequence

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ledgerdb::error::Result;
use ledgerdb::index::{ClusteredIndex, TableSpec};
use ledgerdb::schema::{Column, Fields, Record, Schema, Value};
use ledgerdb::storage::PartitionStore;
use ledgerdb::LedgerError;
use tempfile::TempDir;

// =============================================================================
// Test Record
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: i64,
    tag: i32,
}

const ENTRY_COLUMNS: &[Column] = &[
    Column::long("key", 0).not_null(),
    Column::int("tag", 1).not_null(),
];

impl Record for Entry {
    const SCHEMA: Schema = Schema::new("entries", ENTRY_COLUMNS);

    fn to_values(&self) -> Vec<Value> {
        vec![self.key.into(), self.tag.into()]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut f = Fields::new(Self::SCHEMA, values)?;
        Ok(Self {
            key: f.long()?,
            tag: f.int()?,
        })
    }
}

fn entry_key(entry: &Entry) -> i64 {
    entry.key
}

const ENTRIES: TableSpec<Entry> = TableSpec {
    prefix: "entries",
    sort_key: entry_key,
    primary_key: None,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn entry(key: i64, tag: i32) -> Entry {
    Entry { key, tag }
}

fn open(path: &Path, max: usize) -> ClusteredIndex<Entry> {
    ClusteredIndex::open(path, ENTRIES, max).unwrap()
}

/// Deterministic pseudo-random keys in `0..range`, with repeats
fn scattered_keys(n: usize, range: i64) -> Vec<i64> {
    let mut state: i64 = 12345;
    (0..n)
        .map(|_| {
            state = (state * 1_103_515_245 + 12_345) % 2_147_483_648;
            state % range
        })
        .collect()
}

fn keys_of(entries: &[Entry]) -> Vec<i64> {
    entries.iter().map(|e| e.key).collect()
}

fn sorted(mut entries: Vec<Entry>) -> Vec<(i64, i32)> {
    let mut pairs: Vec<(i64, i32)> = entries.drain(..).map(|e| (e.key, e.tag)).collect();
    pairs.sort();
    pairs
}

/// Partition files and their bytes
fn disk_snapshot(path: &Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "part"))
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            (name, fs::read(&p).unwrap())
        })
        .collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    assert_eq!(index.partition_count(), 0);
    assert!(index.scan().unwrap().is_empty());
    assert!(index.query_index(1).unwrap().is_empty());
    assert_eq!(index.count().unwrap(), 0);
}

#[test]
fn test_open_rejects_zero_capacity() {
    let (_temp, path) = setup_temp_dir();
    let result = ClusteredIndex::open(&path, ENTRIES, 0);

    assert!(matches!(result, Err(LedgerError::Config(_))));
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_ascending_inserts_fill_partitions() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    for key in 0..10 {
        index.insert(entry(key, 0)).unwrap();
    }

    assert_eq!(index.partition_sizes().unwrap(), vec![4, 4, 2]);
    assert_eq!(keys_of(&index.scan().unwrap()), (0..10).rev().collect::<Vec<_>>());
}

#[test]
fn test_insert_before_first_goes_to_head() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    for key in 10..15 {
        index.insert(entry(key, 0)).unwrap();
    }
    index.insert(entry(5, 0)).unwrap();

    // 13 was pushed into partition 1 by the cascade
    assert_eq!(index.partition_sizes().unwrap(), vec![4, 2]);
    assert_eq!(keys_of(&index.scan().unwrap()), vec![14, 13, 12, 11, 10, 5]);
}

#[test]
fn test_cascade_through_several_partitions() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 2);

    for key in [10, 20, 30, 40, 50, 60] {
        index.insert(entry(key, 0)).unwrap();
    }
    assert_eq!(index.partition_sizes().unwrap(), vec![2, 2, 2]);

    index.insert(entry(15, 0)).unwrap();

    assert_eq!(index.partition_sizes().unwrap(), vec![2, 2, 2, 1]);
    assert_eq!(
        keys_of(&index.scan().unwrap()),
        vec![60, 50, 40, 30, 20, 15, 10]
    );
}

#[test]
fn test_scattered_inserts_keep_order_and_bound() {
    let (_temp, path) = setup_temp_dir();
    let max = 5;
    let mut index = open(&path, max);

    for (i, key) in scattered_keys(300, 60).into_iter().enumerate() {
        index.insert(entry(key, i as i32)).unwrap();
        assert!(index.partition_sizes().unwrap().iter().all(|&size| size <= max));
    }

    let keys = keys_of(&index.scan().unwrap());
    assert_eq!(keys.len(), 300);
    assert!(keys.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_partition_ranges_do_not_overlap_on_disk() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 7);

    for (i, key) in scattered_keys(200, 1000).into_iter().enumerate() {
        index.insert(entry(key, i as i32)).unwrap();
    }
    index.flush().unwrap();

    let mut store: PartitionStore<Entry> = PartitionStore::new(&path, "entries");
    let mut previous_max = i64::MIN;
    for partition in 0..store.partition_count().unwrap() {
        let keys = keys_of(&store.partition(partition).read().unwrap());
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        if let (Some(first), Some(last)) = (keys.first(), keys.last()) {
            assert!(previous_max <= *first);
            previous_max = *last;
        }
    }
}

#[test]
fn test_equal_keys_keep_insertion_order() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for tag in 0..7 {
        index.insert(entry(1, tag)).unwrap();
    }

    let tags: Vec<i32> = index.scan().unwrap().iter().map(|e| e.tag).collect();
    assert_eq!(tags, vec![6, 5, 4, 3, 2, 1, 0]);
}

#[test]
fn test_insert_validates_record() {
    const STRICT_COLUMNS: &[Column] = &[
        Column::long("key", 0).not_null().non_negative(),
        Column::int("tag", 1).not_null(),
    ];

    #[derive(Debug, Clone)]
    struct Strict(Entry);

    impl Record for Strict {
        const SCHEMA: Schema = Schema::new("strict", STRICT_COLUMNS);

        fn to_values(&self) -> Vec<Value> {
            self.0.to_values()
        }

        fn from_values(values: Vec<Value>) -> Result<Self> {
            let mut f = Fields::new(Self::SCHEMA, values)?;
            Ok(Strict(entry(f.long()?, f.int()?)))
        }
    }

    fn strict_key(s: &Strict) -> i64 {
        s.0.key
    }

    let (_temp, path) = setup_temp_dir();
    let spec = TableSpec {
        prefix: "strict",
        sort_key: strict_key,
        primary_key: None,
    };
    let mut index = ClusteredIndex::open(&path, spec, 4).unwrap();

    let err = index.insert(Strict(entry(-1, 0))).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidValue { .. }));
    assert_eq!(index.count().unwrap(), 0);
    assert!(!index.is_dirty());
}

// =============================================================================
// Unique Insert Tests
// =============================================================================

#[test]
fn test_insert_unique_rejects_existing_key() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 2);

    for key in [1, 3, 5, 7, 9] {
        index.insert_unique(entry(key, 0)).unwrap();
    }
    let before = index.scan().unwrap();

    for key in [1, 5, 9] {
        let err = index.insert_unique(entry(key, 99)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey { key: k, .. } if k == key));
    }

    assert_eq!(index.scan().unwrap(), before);
}

#[test]
fn test_insert_unique_accepts_new_keys() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 2);

    for key in [5, 1, 9, 3, 7] {
        index.insert_unique(entry(key, 0)).unwrap();
    }

    assert_eq!(keys_of(&index.scan().unwrap()), vec![9, 7, 5, 3, 1]);
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_query_index_matches_scan() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    for (i, key) in scattered_keys(150, 20).into_iter().enumerate() {
        index.insert(entry(key * 2, i as i32)).unwrap();
    }
    let all = index.scan().unwrap();

    // Odd keys are never present
    for key in -1..42 {
        let expected: Vec<Entry> = all.iter().filter(|e| e.key == key).cloned().collect();
        assert_eq!(index.query_index(key).unwrap(), expected, "key {}", key);
    }
}

#[test]
fn test_query_index_run_across_partitions() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    index.insert(entry(0, 0)).unwrap();
    for tag in 0..8 {
        index.insert(entry(4, tag)).unwrap();
    }
    index.insert(entry(9, 0)).unwrap();

    let found = index.query_index(4).unwrap();
    assert_eq!(found.len(), 8);
    assert_eq!(
        found.iter().map(|e| e.tag).collect::<Vec<_>>(),
        (0..8).rev().collect::<Vec<_>>()
    );
}

#[test]
fn test_query_first() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for key in 0..10 {
        index.insert(entry(key, (key % 3) as i32)).unwrap();
    }

    // Scan order is descending, so the highest matching key wins
    let found = index.query_first(|e| e.tag == 1).unwrap();
    assert_eq!(found, Some(entry(7, 1)));
    assert_eq!(index.query_first(|e| e.tag == 5).unwrap(), None);
}

#[test]
fn test_iter_is_restartable() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for key in 0..7 {
        index.insert(entry(key, 0)).unwrap();
    }

    let first: Vec<Entry> = index.iter().take(3).map(|e| e.unwrap()).collect();
    let second: Vec<Entry> = index.iter().map(|e| e.unwrap()).collect();
    assert_eq!(keys_of(&first), vec![6, 5, 4]);
    assert_eq!(second.len(), 7);
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_insert_remove_round_trip() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    for (i, key) in scattered_keys(40, 15).into_iter().enumerate() {
        index.insert(entry(key, i as i32)).unwrap();
    }
    let before = sorted(index.scan().unwrap());

    index.insert(entry(7, 1000)).unwrap();
    let removed = index.remove_first(|e| e.tag == 1000).unwrap();

    assert_eq!(removed, Some(entry(7, 1000)));
    assert_eq!(sorted(index.scan().unwrap()), before);
}

#[test]
fn test_remove_first_missing() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);
    index.insert(entry(1, 0)).unwrap();

    assert_eq!(index.remove_first(|e| e.key == 2).unwrap(), None);
    assert_eq!(index.count().unwrap(), 1);
}

#[test]
fn test_remove_key_removes_whole_run() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for key in [1, 2, 2, 2, 2, 2, 3] {
        index.insert(entry(key, 0)).unwrap();
    }

    let removed = index.remove_key(2).unwrap();
    assert_eq!(removed.len(), 5);
    assert_eq!(keys_of(&index.scan().unwrap()), vec![3, 1]);
    assert!(index.remove_key(2).unwrap().is_empty());
}

#[test]
fn test_cursor_remove_current() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for key in 0..10 {
        index.insert(entry(key, 0)).unwrap();
    }

    let mut cursor = index.iter();
    assert!(cursor.remove_current().unwrap().is_none());
    while let Some(item) = cursor.next() {
        if item.unwrap().key % 2 == 0 {
            cursor.remove_current().unwrap();
            // Only once per yielded record
            assert!(cursor.remove_current().unwrap().is_none());
        }
    }

    assert_eq!(keys_of(&index.scan().unwrap()), vec![9, 7, 5, 3, 1]);
}

#[test]
fn test_removal_does_not_repartition() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 2);

    for key in 0..6 {
        index.insert(entry(key, 0)).unwrap();
    }
    index.remove_key(2).unwrap();
    index.remove_key(3).unwrap();

    assert_eq!(index.partition_sizes().unwrap(), vec![2, 0, 2]);
}

// =============================================================================
// Repartition Tests
// =============================================================================

#[test]
fn test_repartition_compacts() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 3);

    for key in 0..12 {
        index.insert(entry(key, 0)).unwrap();
    }
    for key in [1, 4, 5, 7, 10] {
        index.remove_key(key).unwrap();
    }
    index.flush().unwrap();
    assert_eq!(index.partition_count(), 4);

    index.repartition().unwrap();

    assert_eq!(index.partition_sizes().unwrap(), vec![3, 3, 1]);
    assert_eq!(keys_of(&index.scan().unwrap()), vec![11, 9, 8, 6, 3, 2, 0]);
    assert!(!path.join("entries_3.part").exists());
    assert!(!index.is_dirty());
}

#[test]
fn test_repartition_is_idempotent() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    for (i, key) in scattered_keys(60, 25).into_iter().enumerate() {
        index.insert(entry(key, i as i32)).unwrap();
    }
    for key in [3, 8, 13] {
        index.remove_key(key).unwrap();
    }

    index.repartition().unwrap();
    let once = disk_snapshot(&path);
    index.repartition().unwrap();
    let twice = disk_snapshot(&path);

    assert_eq!(once, twice);

    // Reopened from disk, the layout is the same
    let mut reopened = open(&path, 4);
    assert_eq!(reopened.partition_sizes().unwrap(), index.partition_sizes().unwrap());
}

#[test]
fn test_repartition_empty_table_deletes_files() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 2);

    for key in 0..5 {
        index.insert(entry(key, 0)).unwrap();
    }
    index.flush().unwrap();
    for key in 0..5 {
        index.remove_key(key).unwrap();
    }

    index.repartition().unwrap();

    assert_eq!(index.partition_count(), 0);
    assert!(disk_snapshot(&path).is_empty());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_flush_and_reopen() {
    let (_temp, path) = setup_temp_dir();
    let expected = {
        let mut index = open(&path, 4);
        for (i, key) in scattered_keys(50, 30).into_iter().enumerate() {
            index.insert(entry(key, i as i32)).unwrap();
        }
        index.flush().unwrap();
        index.scan().unwrap()
    };

    let mut reopened = open(&path, 4);
    assert_eq!(reopened.scan().unwrap(), expected);
}

#[test]
fn test_unflushed_changes_not_on_disk() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    index.insert(entry(1, 0)).unwrap();
    assert!(index.is_dirty());

    let mut other = open(&path, 4);
    assert_eq!(other.count().unwrap(), 0);
}

#[test]
fn test_tail_append_after_flush() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 10);

    for key in 0..3 {
        index.insert(entry(key, 0)).unwrap();
    }
    index.flush().unwrap();
    for key in 3..6 {
        index.insert(entry(key, 0)).unwrap();
    }
    index.flush().unwrap();
    assert!(!index.is_dirty());

    let mut reopened = open(&path, 10);
    assert_eq!(keys_of(&reopened.scan().unwrap()), vec![5, 4, 3, 2, 1, 0]);
}

#[test]
fn test_invalidate_drops_unflushed_changes() {
    let (_temp, path) = setup_temp_dir();
    let mut index = open(&path, 4);

    index.insert(entry(1, 0)).unwrap();
    index.flush().unwrap();
    index.insert(entry(2, 0)).unwrap();

    index.invalidate().unwrap();

    assert_eq!(keys_of(&index.scan().unwrap()), vec![1]);
    assert!(!index.is_dirty());
}

// =============================================================================
// Hole Tests
// =============================================================================

#[test]
fn test_holes_are_skipped_and_filled() {
    let (_temp, path) = setup_temp_dir();
    let store: PartitionStore<Entry> = PartitionStore::new(&path, "entries");
    store.partition(0).write(&[entry(1, 0), entry(2, 0)]).unwrap();
    store.partition(3).write(&[entry(10, 0), entry(11, 0)]).unwrap();

    let mut index = open(&path, 2);
    assert_eq!(index.partition_count(), 4);
    assert_eq!(index.partition_sizes().unwrap(), vec![2, 0, 0, 2]);
    assert_eq!(keys_of(&index.scan().unwrap()), vec![11, 10, 2, 1]);

    // Overflow of partition 0 lands in the hole after it
    index.insert(entry(0, 0)).unwrap();
    assert_eq!(index.partition_sizes().unwrap(), vec![2, 1, 0, 2]);
    assert_eq!(index.query_index(2).unwrap(), vec![entry(2, 0)]);
    assert_eq!(keys_of(&index.scan().unwrap()), vec![11, 10, 2, 1, 0]);
}
