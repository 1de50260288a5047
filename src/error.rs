//! Error types for ledgerdb
//!
//! Provides a unified error type for storage, composition and sync operations.
//! Variants fall into four kinds: validation (caller must fix input), I/O,
//! integrity ("data corrupted", never repaired silently) and configuration.

use thiserror::Error;

/// Result type alias using LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Unified error type for ledgerdb operations
#[derive(Debug, Error)]
pub enum LedgerError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: i64 },

    #[error("No row with id {id} in table '{table}'")]
    NotFound { table: String, id: i64 },

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Data corrupted: {0}")]
    DataCorrupted(String),

    // -------------------------------------------------------------------------
    // Sync Errors
    // -------------------------------------------------------------------------
    #[error("Remote is unreachable")]
    RemoteUnreachable,

    #[error("Remote error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Background Task Errors
    // -------------------------------------------------------------------------
    #[error("Background task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// Shorthand for an `InvalidValue` error
    pub fn invalid_value(column: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::InvalidValue {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `DataCorrupted` error
    pub fn corrupted(reason: impl Into<String>) -> Self {
        LedgerError::DataCorrupted(reason.into())
    }

    /// True for integrity violations that need an explicit recovery decision
    pub fn is_data_corrupted(&self) -> bool {
        matches!(self, LedgerError::DataCorrupted(_))
    }

    /// True for errors caused by bad caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidValue { .. }
                | LedgerError::DuplicateKey { .. }
                | LedgerError::NotFound { .. }
        )
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
