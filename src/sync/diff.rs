//! Manifest diff
//!
//! Classifies the files of a head manifest against a target manifest:
//!
//! | head file             | class  |
//! |-----------------------|--------|
//! | absent in target      | copy   |
//! | checksum differs      | update |
//! | checksum equal        | ignore |
//!
//! Target files with no head counterpart are classed *remove*.

use std::collections::HashSet;

use super::{FileInfo, SyncIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub copy: Vec<FileInfo>,
    pub update: Vec<FileInfo>,
    pub ignore: Vec<FileInfo>,
    /// Target-side entries
    pub remove: Vec<FileInfo>,
}

impl Diff {
    /// Diff `head` (the source of truth) against `target`
    pub fn between(head: &SyncIndex, target: &SyncIndex) -> Self {
        let mut diff = Diff::default();

        for file in &head.files {
            match target.file(&file.filename) {
                None => diff.copy.push(file.clone()),
                Some(other) if other.checksum != file.checksum => diff.update.push(file.clone()),
                Some(_) => diff.ignore.push(file.clone()),
            }
        }

        let in_head: HashSet<&str> = head.files.iter().map(|f| f.filename.as_str()).collect();
        diff.remove = target
            .files
            .iter()
            .filter(|f| !in_head.contains(f.filename.as_str()))
            .cloned()
            .collect();

        diff
    }

    /// Files whose content has to move (copy, then update)
    pub fn transfers(&self) -> impl Iterator<Item = &FileInfo> {
        self.copy.iter().chain(self.update.iter())
    }

    /// Payload of all transfers, the basis for progress reporting
    pub fn transfer_bytes(&self) -> u64 {
        self.transfers().map(|f| f.size).sum()
    }

    /// True when applying the diff would change nothing
    pub fn is_empty(&self) -> bool {
        self.copy.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}
