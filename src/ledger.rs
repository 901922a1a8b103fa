//! Persistent set of program identifiers that finished downloading.
//!
//! The ledger only grows: the download driver records an identifier after a
//! successful capture, and the scheduler consults it when it needs to reclaim
//! a reservation slot.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors produced by the file-backed ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file could not be read or written.
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        /// Ledger file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The ledger file is not a JSON array of strings.
    #[error("ledger at {path} is not a JSON array of program ids: {source}")]
    Json {
        /// Ledger file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append-only membership set of downloaded program identifiers.
pub trait Ledger: Send + Sync {
    /// Returns true when `program_id` was already downloaded.
    fn contains(&self, program_id: &str) -> bool;

    /// Records `program_id`; recording a known identifier is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the change cannot be persisted.
    fn record(&mut self, program_id: &str) -> Result<(), LedgerError>;
}

/// Ledger kept in memory only.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    ids: HashSet<String>,
}

impl InMemoryLedger {
    /// Creates a ledger pre-populated with `ids`.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl Ledger for InMemoryLedger {
    fn contains(&self, program_id: &str) -> bool {
        self.ids.contains(program_id)
    }

    fn record(&mut self, program_id: &str) -> Result<(), LedgerError> {
        self.ids.insert(program_id.to_string());
        Ok(())
    }
}

/// Ledger persisted as a JSON array (`downloaded.json`), rewritten on every change.
#[derive(Debug)]
pub struct JsonLedger {
    path: PathBuf,
    order: Vec<String>,
    index: HashSet<String>,
}

impl JsonLedger {
    /// Opens the ledger at `path`; a missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the file exists but cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let order: Vec<String> = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| LedgerError::Json {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(LedgerError::io(&path, e)),
        };

        let mut index = HashSet::with_capacity(order.len());
        let order: Vec<String> = order
            .into_iter()
            .filter(|id| index.insert(id.clone()))
            .collect();
        debug!(entries = order.len(), "Ledger loaded");
        Ok(Self { path, order, index })
    }

    /// Returns recorded identifiers in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of recorded identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn flush(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.order).map_err(|source| LedgerError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| LedgerError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::io(&self.path, e))
    }
}

impl Ledger for JsonLedger {
    fn contains(&self, program_id: &str) -> bool {
        self.index.contains(program_id)
    }

    #[instrument(skip(self))]
    fn record(&mut self, program_id: &str) -> Result<(), LedgerError> {
        if !self.index.insert(program_id.to_string()) {
            return Ok(());
        }
        self.order.push(program_id.to_string());
        if let Err(e) = self.flush() {
            // Roll back so memory matches disk.
            self.order.pop();
            self.index.remove(program_id);
            return Err(e);
        }
        debug!(entries = self.order.len(), "Ledger updated");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_json_ledger_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonLedger::open(dir.path().join("downloaded.json")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.contains("lv1"));
    }

    #[test]
    fn test_json_ledger_record_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");

        let mut ledger = JsonLedger::open(&path).unwrap();
        ledger.record("lv1").unwrap();
        ledger.record("lv2").unwrap();
        drop(ledger);

        let reopened = JsonLedger::open(&path).unwrap();
        assert!(reopened.contains("lv1"));
        assert!(reopened.contains("lv2"));
        assert_eq!(reopened.entries(), ["lv1".to_string(), "lv2".to_string()]);
    }

    #[test]
    fn test_json_ledger_duplicate_record_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        let mut ledger = JsonLedger::open(&path).unwrap();
        ledger.record("lv1").unwrap();
        ledger.record("lv1").unwrap();
        assert_eq!(ledger.len(), 1);

        let on_disk: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, vec!["lv1".to_string()]);
    }

    #[test]
    fn test_json_ledger_reads_existing_array_and_dedupes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        fs::write(&path, r#"["lv9","lv8","lv9"]"#).unwrap();
        let ledger = JsonLedger::open(&path).unwrap();
        assert_eq!(ledger.entries(), ["lv9".to_string(), "lv8".to_string()]);
    }

    #[test]
    fn test_json_ledger_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        fs::write(&path, "{not an array}").unwrap();
        let err = JsonLedger::open(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Json { .. }), "got {err:?}");
    }

    #[test]
    fn test_json_ledger_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        let mut ledger = JsonLedger::open(&path).unwrap();
        ledger.record("lv1").unwrap();
        assert!(!dir.path().join("downloaded.json.tmp").exists());
    }

    #[test]
    fn test_in_memory_ledger() {
        let mut ledger = InMemoryLedger::from_ids(["lv1"]);
        assert!(ledger.contains("lv1"));
        ledger.record("lv2").unwrap();
        assert!(ledger.contains("lv2"));
    }
}
