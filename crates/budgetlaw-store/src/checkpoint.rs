//! Document-granularity checkpoint for resumable runs.
//!
//! On disk:
//!
//! ```json
//! { "lastUpdated": "2025-01-01T00:00:00+00:00", "processedFiles": ["內政/report.md"] }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use budgetlaw_core::DocId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::StoreError;
use crate::atomic::write_atomic;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    processed_files: BTreeSet<String>,
}

/// Set of fully processed documents, persisted after every change.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointFile,
}

impl CheckpointStore {
    /// Load the checkpoint at `path`. A missing file is an empty checkpoint.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::json(&path, e))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => CheckpointFile::default(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        info!(
            path = %path.display(),
            processed = state.processed_files.len(),
            "loaded checkpoint"
        );
        Ok(Self { path, state })
    }

    /// Start from an empty checkpoint, overwriting whatever is at `path`.
    pub fn fresh(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.into(),
            state: CheckpointFile::default(),
        };
        store.persist()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, doc: &DocId) -> bool {
        self.state.processed_files.contains(&doc.key())
    }

    /// Record `doc` as done and persist immediately.
    pub fn mark_processed(&mut self, doc: &DocId) -> Result<(), StoreError> {
        if self.state.processed_files.insert(doc.key()) {
            self.persist()?;
            debug!(%doc, "checkpoint updated");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.processed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.processed_files.is_empty()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.state.last_updated.as_deref()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.state.last_updated = Some(Utc::now().to_rfc3339());
        let bytes =
            serde_json::to_vec_pretty(&self.state).map_err(|e| StoreError::json(&self.path, e))?;
        write_atomic(&self.path, &bytes)
    }
}
