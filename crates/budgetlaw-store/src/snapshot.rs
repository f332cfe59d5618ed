//! Per-document JSON output, mirroring the input tree.

use std::fs;
use std::path::{Path, PathBuf};

use budgetlaw_core::{DocId, ProposalRecord};
use tracing::debug;

use crate::StoreError;
use crate::atomic::write_atomic;

/// Writes `<root>/<committee>/<filename>.json`, replacing the file each time.
///
/// The full input file name is kept, so `a.md` and `a.txt` in one committee
/// get separate snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, doc: &DocId) -> PathBuf {
        self.root
            .join(&doc.committee)
            .join(format!("{}.json", doc.filename))
    }

    /// Overwrite the snapshot for `doc` with `records`, sorted by category then content.
    pub fn write(&self, doc: &DocId, records: &[ProposalRecord]) -> Result<PathBuf, StoreError> {
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.content.cmp(&b.content))
        });

        let path = self.path_for(doc);
        let bytes = serde_json::to_vec_pretty(&sorted).map_err(|e| StoreError::json(&path, e))?;
        write_atomic(&path, &bytes)?;
        debug!(%doc, records = sorted.len(), path = %path.display(), "snapshot written");
        Ok(path)
    }

    pub fn read(&self, doc: &DocId) -> Result<Vec<ProposalRecord>, StoreError> {
        read_file(&self.path_for(doc))
    }

    /// Every snapshot under the root, committees and files in name order.
    ///
    /// Hidden entries (such as the checkpoint file) are skipped.
    pub fn read_all(&self) -> Result<Vec<ProposalRecord>, StoreError> {
        let mut records = Vec::new();
        for committee in visible_entries(&self.root)? {
            if !committee.is_dir() {
                continue;
            }
            for file in visible_entries(&committee)? {
                if file.extension().is_some_and(|ext| ext == "json") {
                    records.extend(read_file(&file)?);
                }
            }
        }
        Ok(records)
    }
}

fn read_file(path: &Path) -> Result<Vec<ProposalRecord>, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::json(path, e))
}

fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        if !entry.file_name().to_string_lossy().starts_with('.') {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}
