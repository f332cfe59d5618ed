//! Extraction run: discover documents, resolve their segments, snapshot, checkpoint.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use budgetlaw_ai::ConsensusResolver;
use budgetlaw_core::{BoundedPool, DocId, Progress, Segmenter};
use budgetlaw_store::{CheckpointStore, SnapshotWriter};
use futures::StreamExt;
use tracing::{info, warn};

const INPUT_EXTENSIONS: &[&str] = &["md", "txt"];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    /// Start with an empty checkpoint.
    pub fresh: bool,
    /// File names or `committee/file` keys to leave out.
    pub skip: HashSet<String>,
    pub doc_concurrency: usize,
    pub segment_concurrency: usize,
    /// Completed segments between snapshots; 0 writes only at document end.
    pub snapshot_every: usize,
}

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocId,
    pub path: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub discovered: usize,
    /// Already in the checkpoint.
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub segments: usize,
    pub records: usize,
}

#[derive(Debug)]
struct DocSummary {
    doc: DocId,
    segments: usize,
    records: usize,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        let path = entry.path();
        if !is_hidden(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// List `<input>/<committee>/<file>` documents in name order.
///
/// Failing to read the input tree is fatal.
pub fn discover(input: &Path, skip: &HashSet<String>) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for committee_dir in sorted_entries(input)? {
        if !committee_dir.is_dir() {
            continue;
        }
        let committee = committee_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for path in sorted_entries(&committee_dir)? {
            let is_input = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| INPUT_EXTENSIONS.contains(&e));
            if !is_input {
                continue;
            }
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = DocId::new(committee.clone(), filename);
            if skip.contains(&id.filename) || skip.contains(&id.key()) {
                info!(doc = %id, "skipped by --skip");
                continue;
            }
            documents.push(Document { id, path });
        }
    }
    Ok(documents)
}

/// Snapshot after `completed` of `total` segments?
fn snapshot_due(completed: usize, total: usize, every: usize) -> bool {
    every > 0 && completed < total && completed % every == 0
}

pub struct Pipeline {
    resolver: ConsensusResolver,
    segmenter: Segmenter,
    snapshots: SnapshotWriter,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(resolver: ConsensusResolver, config: PipelineConfig) -> Self {
        Self {
            resolver,
            segmenter: Segmenter,
            snapshots: SnapshotWriter::new(config.output.clone()),
            config,
        }
    }

    pub async fn run(&self) -> Result<RunStats> {
        let mut checkpoint = if self.config.fresh {
            CheckpointStore::fresh(&self.config.checkpoint)?
        } else {
            CheckpointStore::load(&self.config.checkpoint)?
        };

        let documents = discover(&self.config.input, &self.config.skip)?;
        let pending: Vec<&Document> = documents
            .iter()
            .filter(|d| !checkpoint.is_processed(&d.id))
            .collect();

        let mut stats = RunStats {
            discovered: documents.len(),
            skipped: documents.len() - pending.len(),
            ..Default::default()
        };
        info!(
            discovered = stats.discovered,
            pending = pending.len(),
            skipped = stats.skipped,
            "starting extraction"
        );

        let progress = Progress::new(pending.len());
        let tasks = pending.iter().map(|doc| self.process(doc));
        let mut outcomes = BoundedPool::new(self.config.doc_concurrency).run(tasks);

        while let Some(outcome) = outcomes.next().await {
            progress.advance();
            match outcome {
                Ok(summary) => {
                    checkpoint.mark_processed(&summary.doc)?;
                    stats.processed += 1;
                    stats.segments += summary.segments;
                    stats.records += summary.records;
                    info!(
                        doc = %summary.doc,
                        segments = summary.segments,
                        records = summary.records,
                        done = progress.done(),
                        total = progress.total(),
                        percent = %format!("{:.1}", progress.percent()),
                        "document complete"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %format!("{e:#}"), "document failed, will retry on next run");
                }
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            records = stats.records,
            "extraction finished"
        );
        Ok(stats)
    }

    async fn process(&self, doc: &Document) -> Result<DocSummary> {
        let text = tokio::fs::read_to_string(&doc.path)
            .await
            .with_context(|| format!("reading {}", doc.path.display()))?;

        let segments = self.segmenter.split(&doc.id, &text);
        let total = segments.len();
        if total == 0 {
            info!(doc = %doc.id, "no proposals found");
            return Ok(DocSummary {
                doc: doc.id.clone(),
                segments: 0,
                records: 0,
            });
        }

        let mut records = Vec::new();
        let mut completed = 0;
        let tasks = segments.iter().map(|segment| self.resolver.resolve(segment));
        let mut resolved = BoundedPool::new(self.config.segment_concurrency).run_indexed(tasks);

        while let Some((index, batch)) = resolved.next().await {
            completed += 1;
            records.extend(batch);
            info!(
                "[{}] {completed}/{total} (segment {index}, {} records)",
                doc.id.filename,
                records.len()
            );
            if snapshot_due(completed, total, self.config.snapshot_every) {
                self.snapshots.write(&doc.id, &records)?;
            }
        }

        self.snapshots.write(&doc.id, &records)?;
        Ok(DocSummary {
            doc: doc.id.clone(),
            segments: total,
            records: records.len(),
        })
    }
}
