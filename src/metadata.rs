//! Per-program metadata snapshots (`<data_dir>/<programId>/details.json`).
//!
//! The scheduler writes a candidate's search record when the reservation is
//! accepted, so the download driver can report title, provider and thumbnail
//! later without searching again. The program directory doubles as the
//! recorder's output directory.

use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::platform::Candidate;

const DETAILS_FILE: &str = "details.json";

/// Errors produced by the snapshot store.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// I/O error reading or writing a snapshot.
    #[error("metadata I/O error at {path}: {source}")]
    Io {
        /// Snapshot path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Snapshot could not be serialized or deserialized.
    #[error("metadata JSON error at {path}: {source}")]
    Json {
        /// Snapshot path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Store of candidate snapshots rooted at the data directory.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the per-program directory (also the recorder output directory).
    #[must_use]
    pub fn program_dir(&self, program_id: &str) -> PathBuf {
        self.root.join(program_id)
    }

    fn details_path(&self, program_id: &str) -> PathBuf {
        self.program_dir(program_id).join(DETAILS_FILE)
    }

    /// Writes (or replaces) the snapshot for `candidate`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on I/O or serialization failure.
    #[instrument(skip(self, candidate), fields(program_id = %candidate.program_id))]
    pub fn write(&self, candidate: &Candidate) -> Result<PathBuf, MetadataError> {
        let dir = self.program_dir(&candidate.program_id);
        fs::create_dir_all(&dir).map_err(|source| MetadataError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = self.details_path(&candidate.program_id);
        let file = fs::File::create(&path).map_err(|source| MetadataError::Io {
            path: path.clone(),
            source,
        })?;
        let write_result = serde_json::to_writer_pretty(BufWriter::new(file), candidate);
        if let Err(source) = write_result {
            let _ = fs::remove_file(&path);
            return Err(MetadataError::Json { path, source });
        }
        debug!(path = %path.display(), "Snapshot written");
        Ok(path)
    }

    /// Reads the snapshot for `program_id`; `None` when none was written.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the snapshot exists but is unreadable.
    #[instrument(skip(self))]
    pub fn read(&self, program_id: &str) -> Result<Option<Candidate>, MetadataError> {
        let path = self.details_path(program_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MetadataError::Io { path, source }),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| MetadataError::Json { path, source })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::platform::{ProgramKind, Provider, Statistics};

    fn candidate(id: &str) -> Candidate {
        Candidate {
            program_id: id.to_string(),
            title: "Evening talk".to_string(),
            description: "desc".to_string(),
            kind: ProgramKind::Future,
            thumbnail_url: "https://img.example/t.jpg".to_string(),
            time: None,
            statistics: Statistics {
                visitors: Some(3),
                comments: None,
                timeshifts: Some(1),
            },
            provider: Provider {
                username: "Channel One".to_string(),
                user_id: "ch1".to_string(),
                icon_url: "https://img.example/ch1.jpg".to_string(),
            },
        }
    }

    #[test]
    fn test_write_then_read_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        let path = store.write(&candidate("lv1")).unwrap();
        assert_eq!(path, dir.path().join("lv1").join("details.json"));
        assert_eq!(store.read("lv1").unwrap(), Some(candidate("lv1")));
    }

    #[test]
    fn test_snapshot_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        let path = store.write(&candidate("lv1")).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["programId"], "lv1");
        assert_eq!(json["thumbnailUrl"], "https://img.example/t.jpg");
        assert_eq!(json["provider"]["userId"], "ch1");
    }

    #[test]
    fn test_read_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(store.read("lv404").unwrap().is_none());
    }

    #[test]
    fn test_read_corrupt_snapshot_is_json_error() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        fs::create_dir_all(store.program_dir("lv1")).unwrap();
        fs::write(store.program_dir("lv1").join("details.json"), "nope").unwrap();
        assert!(matches!(
            store.read("lv1").unwrap_err(),
            MetadataError::Json { .. }
        ));
    }
}
