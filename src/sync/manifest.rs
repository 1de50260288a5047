//! Sync manifest
//!
//! Per-store list of files with checksums and sizes, plus the two version
//! counters used to detect drift between endpoints.
//!
//! ## File Format
//! bincode encoding of [`SyncIndex`], written to a synced temporary file
//! (`<manifest>.tmp`) and renamed over the old manifest.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::write_atomic;

/// One synchronized file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    /// CRC32 of the content, big-endian
    pub checksum: Vec<u8>,
    pub size: u64,
}

impl FileInfo {
    /// Describe the file at `path`, recorded under `filename`
    pub fn from_path(filename: impl Into<String>, path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = [0u8; 8192];
        let mut size = 0u64;

        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        Ok(Self {
            filename: filename.into(),
            checksum: hasher.finalize().to_be_bytes().to_vec(),
            size,
        })
    }
}

/// A store's manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncIndex {
    /// Sorted by filename
    pub files: Vec<FileInfo>,

    /// Bumped by a fixed step on every local commit
    pub version: f64,

    /// Remote version this store last reconciled with
    pub base_version: f64,
}

impl SyncIndex {
    /// Load a manifest; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(bincode::deserialize(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist via synced temp file + rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Local edits not yet reconciled with the remote
    pub fn has_local_changes(&self) -> bool {
        self.version > self.base_version
    }

    pub fn file(&self, filename: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.filename == filename)
    }
}
