//! Configuration for ledgerdb
//!
//! Centralized configuration with sensible defaults. A `Config` is the one
//! context object handed to the database and the synchronizer; nothing in the
//! crate reads process-wide state.

use std::path::PathBuf;

/// Main configuration for a ledgerdb store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── <table>_<n>.part     (partition files, one set per table)
    ///     ├── metadata.properties  (id counters and row counts)
    ///     └── .sync_index          (sync manifest)
    pub data_dir: PathBuf,

    /// Max number of records held by one partition file
    pub max_partition_size: usize,

    /// Name of the metadata property page inside `data_dir`
    pub properties_filename: String,

    // -------------------------------------------------------------------------
    // Sync Configuration
    // -------------------------------------------------------------------------
    /// Step added to the manifest version on every local commit
    pub version_increment: f64,

    /// Name of the sync manifest file (local and remote)
    pub manifest_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ledgerdb_data"),
            max_partition_size: 256,
            properties_filename: "metadata.properties".to_string(),
            version_increment: 1.0,
            manifest_filename: ".sync_index".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Path of the metadata property page
    pub fn properties_path(&self) -> PathBuf {
        self.data_dir.join(&self.properties_filename)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the partition capacity (records per partition file)
    pub fn max_partition_size(mut self, size: usize) -> Self {
        self.config.max_partition_size = size;
        self
    }

    /// Set the metadata property page file name
    pub fn properties_filename(mut self, name: impl Into<String>) -> Self {
        self.config.properties_filename = name.into();
        self
    }

    /// Set the manifest version step
    pub fn version_increment(mut self, step: f64) -> Self {
        self.config.version_increment = step;
        self
    }

    /// Set the sync manifest file name
    pub fn manifest_filename(mut self, name: impl Into<String>) -> Self {
        self.config.manifest_filename = name.into();
        self
    }

    pub fn build(mut self) -> Config {
        // A zero capacity would make every insert cascade forever
        self.config.max_partition_size = self.config.max_partition_size.max(1);
        self.config
    }
}
