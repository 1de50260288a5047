//! Push/pull protocol
//!
//! ## Status
//! ```text
//! remote unreachable                          → RemoteUnreachable
//! both manifests empty                        → UpToDate
//! remote empty                                → NeedPush
//! local empty                                 → NeedPull
//! base > remote.version                       → DataCorrupted (fatal)
//! no local changes, base == remote.version    → UpToDate
//! local changes,    base == remote.version    → NeedPush
//! no local changes, base <  remote.version    → NeedPull
//! otherwise                                   → VersionConflict
//! ```
//!
//! Reachability is checked before any file is touched. Manifests are written
//! last, so an interrupted transfer never advertises a version that was not
//! fully copied.

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LedgerError, Result};

use super::{Diff, FileInfo, LocalStore, Remote, SyncIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    NeedPush,
    NeedPull,
    VersionConflict,
    RemoteUnreachable,
}

/// How a pull treats the local manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Only from `UpToDate` or `NeedPull`
    Normal,
    /// Overwrite local state whatever the status
    Force,
    /// Like `Force`, but keep the local base version
    KeepBaseVersion,
}

/// What a completed push or pull did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub copied: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub ignored: usize,
    /// Bytes transferred
    pub bytes: u64,
    /// Version of the destination manifest afterwards
    pub version: f64,
}

impl SyncReport {
    /// Number of files copied, updated or removed
    pub fn changes(&self) -> usize {
        self.copied.len() + self.updated.len() + self.removed.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Not attempted; the status calls for a forced operation
    Rejected(SyncStatus),
}

/// Classify a local manifest against a remote one
pub fn classify(local: &SyncIndex, remote: &SyncIndex) -> Result<SyncStatus> {
    match (local.is_empty(), remote.is_empty()) {
        (true, true) => return Ok(SyncStatus::UpToDate),
        (false, true) => return Ok(SyncStatus::NeedPush),
        (true, false) => return Ok(SyncStatus::NeedPull),
        (false, false) => {}
    }

    if local.base_version > remote.version {
        return Err(LedgerError::corrupted(format!(
            "local base version {} is ahead of remote version {}",
            local.base_version, remote.version
        )));
    }

    let changed = local.has_local_changes();
    let behind = local.base_version < remote.version;
    Ok(match (changed, behind) {
        (false, false) => SyncStatus::UpToDate,
        (true, false) => SyncStatus::NeedPush,
        (false, true) => SyncStatus::NeedPull,
        (true, true) => SyncStatus::VersionConflict,
    })
}

/// Reconciles the local store with one remote
pub struct Synchronizer<R: Remote> {
    local: LocalStore,
    remote: R,
    increment: f64,
}

impl<R: Remote> Synchronizer<R> {
    pub fn new(config: &Config, remote: R) -> Result<Self> {
        Ok(Self {
            local: LocalStore::open(config)?,
            remote,
            increment: config.version_increment,
        })
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Current status; uncommitted local edits count as local changes
    pub fn status(&self) -> Result<SyncStatus> {
        if !self.remote.is_reachable() {
            return Ok(SyncStatus::RemoteUnreachable);
        }
        let local = self.local.snapshot(self.increment)?;
        let remote = self.remote.get_index()?;
        classify(&local, &remote)
    }

    /// Make the local store match the remote
    ///
    /// `progress` receives the transferred fraction of the payload in bytes.
    pub fn pull(&mut self, mode: PullMode, progress: &mut dyn FnMut(f64)) -> Result<SyncOutcome> {
        self.ensure_reachable()?;

        let local = self.local.commit(self.increment)?;
        let remote = self.remote.get_index()?;
        let status = classify(&local, &remote)?;

        if mode == PullMode::Normal && !matches!(status, SyncStatus::UpToDate | SyncStatus::NeedPull) {
            warn!("Pull rejected: {:?}", status);
            return Ok(SyncOutcome::Rejected(status));
        }

        let diff = Diff::between(&remote, &local);
        let mut report = self.transfer(&diff, progress, |sync, file| {
            sync.remote
                .download_file(&file.filename, &sync.local.path_of(&file.filename)?)
        })?;

        for file in &diff.remove {
            self.local.remove_file(&file.filename)?;
            report.removed.push(file.filename.clone());
        }

        let mut next = remote;
        next.base_version = match mode {
            PullMode::KeepBaseVersion => local.base_version,
            PullMode::Normal | PullMode::Force => next.version,
        };
        self.local.save_index(&next)?;

        report.version = next.version;
        info!(
            "Pulled to version {}: {} copied, {} updated, {} removed, {} bytes",
            report.version,
            report.copied.len(),
            report.updated.len(),
            report.removed.len(),
            report.bytes
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// Make the remote store match the local one
    ///
    /// A forced push always claims a version newer than both sides hold.
    pub fn push(&mut self, force: bool, progress: &mut dyn FnMut(f64)) -> Result<SyncOutcome> {
        self.ensure_reachable()?;

        let mut local = self.local.commit(self.increment)?;
        let remote = self.remote.get_index()?;
        let status = classify(&local, &remote)?;

        if !force && !matches!(status, SyncStatus::UpToDate | SyncStatus::NeedPush) {
            warn!("Push rejected: {:?}", status);
            return Ok(SyncOutcome::Rejected(status));
        }
        if force {
            local.version = local.version.max(remote.version) + self.increment;
        }

        let diff = Diff::between(&local, &remote);
        let mut report = self.transfer(&diff, progress, |sync, file| {
            sync.remote
                .upload_file(&sync.local.path_of(&file.filename)?, &file.filename)
        })?;

        for file in &diff.remove {
            self.remote.remove_file(&file.filename)?;
            report.removed.push(file.filename.clone());
        }

        local.base_version = local.version;
        self.remote.put_index(&local)?;
        self.local.save_index(&local)?;

        report.version = local.version;
        info!(
            "Pushed version {}: {} copied, {} updated, {} removed, {} bytes",
            report.version,
            report.copied.len(),
            report.updated.len(),
            report.removed.len(),
            report.bytes
        );
        Ok(SyncOutcome::Completed(report))
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.remote.is_reachable() {
            Ok(())
        } else {
            warn!("Remote unreachable, nothing touched");
            Err(LedgerError::RemoteUnreachable)
        }
    }

    /// Move every copy/update file with `move_file`, reporting progress
    fn transfer<F>(&self, diff: &Diff, progress: &mut dyn FnMut(f64), mut move_file: F) -> Result<SyncReport>
    where
        F: FnMut(&Self, &FileInfo) -> Result<()>,
    {
        let total = diff.transfer_bytes();
        let mut report = SyncReport {
            ignored: diff.ignore.len(),
            ..SyncReport::default()
        };

        for file in &diff.copy {
            move_file(self, file)?;
            report.copied.push(file.filename.clone());
            report.bytes += file.size;
            progress(fraction(report.bytes, total));
        }
        for file in &diff.update {
            move_file(self, file)?;
            report.updated.push(file.filename.clone());
            report.bytes += file.size;
            progress(fraction(report.bytes, total));
        }

        progress(1.0);
        Ok(report)
    }
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}
