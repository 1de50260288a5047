//! Storage Module
//!
//! File-level persistence: partition files and the metadata property page.
//!
//! ## Responsibilities
//! - One file per partition, named `<table>_<n>.part`
//! - Partition content is records back to back, ended by end-of-file
//! - Missing partition files are empty partitions (holes)
//! - Key/value property page for counters
//! - Every write is synced before it returns; replaced files go through a
//!   synced temp file and rename
//!
//! ## Partition File Format
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │   Record 0   │   Record 1   │ ... │   Record N   │  EOF
//! └──────────────┴──────────────┴─────┴──────────────┘
//! (each record encoded by its table's schema, see `schema`)
//! ```

mod partition;
mod properties;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use partition::{Partition, PartitionStore, PARTITION_EXTENSION};
pub use properties::PropertyPage;

/// Sibling used while replacing `path`: `<file name>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` durably
///
/// Writes and syncs the temp file, renames it over `path`, then syncs the
/// parent directory so the rename itself survives power loss.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    sync_parent(path);
    Ok(())
}

/// Copy `src` to `dest` and sync the copy to disk
pub fn copy_synced(src: &Path, dest: &Path) -> io::Result<u64> {
    let copied = fs::copy(src, dest)?;
    OpenOptions::new().write(true).open(dest)?.sync_all()?;
    Ok(copied)
}

/// Best-effort sync of the directory holding `path`
///
/// Not every platform can open a directory; failures are ignored there.
pub(crate) fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent() {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }
}
