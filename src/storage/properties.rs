//! Property Page
//!
//! Small key/value text file holding id counters and denormalized row
//! counts. Read once at open, written back on every flush.
//!
//! ## File Format
//! ```text
//! # comment lines and blank lines are ignored
//! clients.max_id=17
//! invoices.count=42
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::{LedgerError, Result};

/// In-memory copy of a property page file
#[derive(Debug, Clone)]
pub struct PropertyPage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl PropertyPage {
    /// Load the page at `path`; a missing file gives an empty page
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = BTreeMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                LedgerError::corrupted(format!(
                    "{}:{}: expected key=value",
                    path.display(),
                    line_no + 1
                ))
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Numeric property, `None` when the key is absent
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                LedgerError::corrupted(format!(
                    "property '{}' in {} is not a number: '{}'",
                    key,
                    self.path.display(),
                    raw
                ))
            }),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn set_i64(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Write the page back to its file, replacing it atomically
    pub fn save(&self) -> Result<()> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        super::write_atomic(&self.path, out.as_bytes())?;
        Ok(())
    }
}
