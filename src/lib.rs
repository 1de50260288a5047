//! # ledgerdb
//!
//! A small embedded, file-based invoice database with remote replication:
//! - Typed fixed-schema record codec with an optional null bitmap
//! - Clustered indexes over size-bounded partition files
//! - Relational composition of six tables into invoice aggregates
//! - Manifest-based push/pull synchronization with conflict detection
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Database (invoices, clients, items)          │
//! │          join by range query + per-read memo cache           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ six tables
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        ClusteredIndex / PrimaryKeyIndex (one per table)      │
//! │          ordered partitions, cascade re-insertion            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Schema    │          │   Storage   │
//!   │   (codec)   │          │ (.part files│
//!   └─────────────┘          │ + metadata) │
//!                            └──────┬──────┘
//!                                   │ same files
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Sync     │
//!                           │ (push/pull) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod storage;
pub mod index;
pub mod db;
pub mod sync;
pub mod task;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LedgerError, Result};
pub use config::Config;
pub use db::{Client, Database, Invoice, Item, Purchase, PurchaseGroup};
pub use sync::{DirectoryRemote, PullMode, Remote, SyncOutcome, SyncStatus, Synchronizer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ledgerdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
