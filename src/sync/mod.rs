//! Sync Module
//!
//! Two-endpoint replication of a data directory.
//!
//! ## Responsibilities
//! - Keep a manifest per store: files with checksum and size, `version` and
//!   `base_version`
//! - Classify the (local, remote) pair into a [`SyncStatus`]
//! - Diff manifests into copy/update/ignore/remove sets
//! - Pull (remote → local) and push (local → remote), manifests last
//!
//! ## Flow
//! ```text
//!  local dir ──commit──► local manifest ─┐
//!                                        ├─ classify ─► status
//!  remote ───get_index─► remote manifest ┘
//!                                        │
//!                     pull: Diff(remote, local), download, delete locally
//!                     push: Diff(local, remote), upload, delete remotely
//! ```
//!
//! A `VersionConflict` is a status, not an error. Only a forced push or pull
//! resolves it.

mod diff;
mod endpoint;
mod manifest;
mod protocol;

pub use diff::Diff;
pub use endpoint::{DirectoryRemote, LocalStore, Remote};
pub use manifest::{FileInfo, SyncIndex};
pub use protocol::{classify, PullMode, SyncOutcome, SyncReport, SyncStatus, Synchronizer};
