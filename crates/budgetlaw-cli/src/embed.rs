//! Sync run: read snapshots, embed every record, replace the vector store contents.

use anyhow::{Context, Result};
use budgetlaw_ai::{Embedder, enrich};
use budgetlaw_core::BoundedPool;
use budgetlaw_store::{BatchUploader, RecordSink, SnapshotWriter};
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub records: usize,
    pub embedded: usize,
    pub uploaded: usize,
}

impl SyncStats {
    pub fn missing_vectors(&self) -> usize {
        self.records - self.embedded
    }
}

pub async fn sync(
    snapshots: &SnapshotWriter,
    embedder: &dyn Embedder,
    sink: &dyn RecordSink,
    uploader: &BatchUploader,
    pool: BoundedPool,
) -> Result<SyncStats> {
    let records = snapshots
        .read_all()
        .with_context(|| format!("reading snapshots under {}", snapshots.root().display()))?;
    info!(records = records.len(), "loaded snapshot records");

    let total = records.len();
    let enriched = enrich(embedder, records, pool).await;
    let embedded = enriched.iter().filter(|r| r.vector.is_some()).count();

    let uploaded = uploader
        .replace_all(sink, &enriched)
        .await
        .context("uploading to the vector store")?;

    let stats = SyncStats {
        records: total,
        embedded,
        uploaded,
    };
    info!(
        records = stats.records,
        embedded = stats.embedded,
        missing_vectors = stats.missing_vectors(),
        uploaded = stats.uploaded,
        "sync finished"
    );
    Ok(stats)
}
