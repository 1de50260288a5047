//! Sync endpoints
//!
//! The local store is a directory of data files plus its manifest. A remote
//! is anything implementing [`Remote`]; [`DirectoryRemote`] keeps the remote
//! store in another directory.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::storage::{copy_synced, temp_path};

use super::{FileInfo, SyncIndex};

/// The remote end of a sync
///
/// Calls block until done. `is_reachable` is a cheap probe made once at the
/// start of each push or pull.
pub trait Remote {
    fn is_reachable(&self) -> bool;

    /// Remote manifest; empty when the remote holds none
    fn get_index(&self) -> Result<SyncIndex>;

    fn put_index(&self, index: &SyncIndex) -> Result<()>;

    /// Copy remote `filename` to the local path `dest`
    fn download_file(&self, filename: &str, dest: &Path) -> Result<()>;

    /// Copy the local file `src` to remote `filename`
    fn upload_file(&self, src: &Path, filename: &str) -> Result<()>;

    /// Remove remote `filename`; absent files are not an error
    fn remove_file(&self, filename: &str) -> Result<()>;
}

/// Manifest names are single path components
fn checked_name(filename: &str) -> Result<&str> {
    let plain = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\']);
    if plain {
        Ok(filename)
    } else {
        Err(LedgerError::corrupted(format!(
            "manifest lists an invalid file name '{}'",
            filename
        )))
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// =============================================================================
// Local Store
// =============================================================================

/// The local data directory and its manifest
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
    manifest_name: String,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>, manifest_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            manifest_name: manifest_name.into(),
        }
    }

    /// The store over `config.data_dir`, creating the directory
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self::new(&config.data_dir, &config.manifest_filename))
    }

    /// Local path of a manifest entry
    pub fn path_of(&self, filename: &str) -> Result<PathBuf> {
        Ok(self.dir.join(checked_name(filename)?))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_name)
    }

    pub fn load_index(&self) -> Result<SyncIndex> {
        SyncIndex::load(&self.manifest_path())
    }

    pub fn save_index(&self, index: &SyncIndex) -> Result<()> {
        SyncIndex::save(index, &self.manifest_path())
    }

    /// Describe every regular file in the store, sorted by name
    ///
    /// The manifest itself and its temporary file are left out.
    pub fn create_index(&self) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.is_manifest_file(&name) {
                continue;
            }
            files.push(FileInfo::from_path(name, &entry.path())?);
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// The manifest itself, or the temp file it is replaced through
    fn is_manifest_file(&self, name: &str) -> bool {
        let manifest = self.manifest_path();
        name == self.manifest_name || temp_path(&manifest).file_name() == Some(OsStr::new(name))
    }

    /// The manifest as it would be after a commit, without saving it
    pub fn snapshot(&self, increment: f64) -> Result<SyncIndex> {
        let mut index = self.load_index()?;
        let files = self.create_index()?;
        if files != index.files {
            index.files = files;
            index.version += increment;
        }
        Ok(index)
    }

    /// Record the current file set, bumping `version` when it changed
    pub fn commit(&self, increment: f64) -> Result<SyncIndex> {
        let before = self.load_index()?;
        let index = self.snapshot(increment)?;
        if index != before {
            self.save_index(&index)?;
            debug!(
                "Committed {} files at version {}",
                index.files.len(),
                index.version
            );
        }
        Ok(index)
    }

    pub fn remove_file(&self, filename: &str) -> Result<()> {
        remove_if_present(&self.path_of(filename)?)?;
        Ok(())
    }
}

// =============================================================================
// Directory Remote
// =============================================================================

/// A remote store kept in a directory
#[derive(Debug)]
pub struct DirectoryRemote {
    root: PathBuf,
    manifest_name: String,
    reachable: AtomicBool,
}

impl DirectoryRemote {
    /// Open (creating) the remote directory `root`
    pub fn open(root: impl Into<PathBuf>, manifest_name: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            manifest_name: manifest_name.into(),
            reachable: AtomicBool::new(true),
        })
    }

    /// Simulate connectivity loss or recovery
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn path_of(&self, filename: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked_name(filename)?))
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(LedgerError::RemoteUnreachable)
        }
    }
}

fn transport(filename: &str, err: io::Error) -> LedgerError {
    LedgerError::Remote(format!("{}: {}", filename, err))
}

impl Remote for DirectoryRemote {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst) && self.root.is_dir()
    }

    fn get_index(&self) -> Result<SyncIndex> {
        self.ensure_reachable()?;
        SyncIndex::load(&self.root.join(&self.manifest_name))
    }

    fn put_index(&self, index: &SyncIndex) -> Result<()> {
        self.ensure_reachable()?;
        index.save(&self.root.join(&self.manifest_name))
    }

    fn download_file(&self, filename: &str, dest: &Path) -> Result<()> {
        self.ensure_reachable()?;
        copy_synced(&self.path_of(filename)?, dest).map_err(|e| transport(filename, e))?;
        Ok(())
    }

    fn upload_file(&self, src: &Path, filename: &str) -> Result<()> {
        self.ensure_reachable()?;
        copy_synced(src, &self.path_of(filename)?).map_err(|e| transport(filename, e))?;
        Ok(())
    }

    fn remove_file(&self, filename: &str) -> Result<()> {
        self.ensure_reachable()?;
        remove_if_present(&self.path_of(filename)?).map_err(|e| transport(filename, e))
    }
}
