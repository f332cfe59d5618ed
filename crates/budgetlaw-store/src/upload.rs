//! Chunked, retried delivery of enriched records to a destination store.

use std::time::Duration;

use async_trait::async_trait;
use budgetlaw_core::EnrichedRecord;
use tracing::{info, warn};

use crate::StoreError;

/// Destination of a sync run.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Remove every existing record.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Append one chunk. A failed insert must leave nothing behind, so that a retry
    /// does not duplicate rows.
    async fn insert(&self, records: &[EnrichedRecord]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchUploader {
    chunk_size: usize,
    max_retries: usize,
    base_delay: Duration,
}

impl Default for BatchUploader {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl BatchUploader {
    /// A `chunk_size` of 0 is treated as 1.
    pub fn new(chunk_size: usize, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_retries,
            base_delay,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Insert `records` in order, one chunk at a time.
    ///
    /// A failing chunk is retried after `base_delay * n` for retry `n`. When a
    /// chunk exhausts its retries the upload stops with
    /// [`StoreError::UploadExhausted`]; later chunks are not sent.
    pub async fn upload(
        &self,
        sink: &dyn RecordSink,
        records: &[EnrichedRecord],
    ) -> Result<usize, StoreError> {
        let chunks = records.len().div_ceil(self.chunk_size);
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let mut retries = 0;
            loop {
                match sink.insert(chunk).await {
                    Ok(()) => break,
                    Err(e) if retries < self.max_retries => {
                        retries += 1;
                        warn!(chunk = index, retry = retries, error = %e, "chunk upload failed, retrying");
                        tokio::time::sleep(self.base_delay * retries as u32).await;
                    }
                    Err(e) => {
                        return Err(StoreError::UploadExhausted {
                            chunk: index,
                            attempts: retries + 1,
                            source: Box::new(e),
                        });
                    }
                }
            }
            info!(chunk = index + 1, chunks, rows = chunk.len(), "uploaded chunk");
        }
        Ok(records.len())
    }

    /// Clear the destination once, then upload everything.
    pub async fn replace_all(
        &self,
        sink: &dyn RecordSink,
        records: &[EnrichedRecord],
    ) -> Result<usize, StoreError> {
        sink.clear().await?;
        self.upload(sink, records).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use budgetlaw_core::{Action, ProposalRecord};

    use super::*;

    /// Records every insert call; fails the calls whose (0-based) number is in `fail`.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<usize>>,
        clears: Mutex<usize>,
        fail: HashSet<usize>,
    }

    impl RecordingSink {
        fn failing(calls: impl IntoIterator<Item = usize>) -> Self {
            Self {
                fail: calls.into_iter().collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordSink for RecordingSink {
        async fn clear(&self) -> Result<(), StoreError> {
            *self.clears.lock().unwrap() += 1;
            Ok(())
        }

        async fn insert(&self, records: &[EnrichedRecord]) -> Result<(), StoreError> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.len();
            calls.push(records.len());
            if self.fail.contains(&n) {
                return Err(StoreError::Other(format!("call {n} refused")));
            }
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<EnrichedRecord> {
        (0..n)
            .map(|i| EnrichedRecord {
                record: ProposalRecord {
                    category: "內政部".into(),
                    content: format!("提案 {i}"),
                    action: Action::Other,
                    proposer: vec![],
                    co_signers: vec![],
                    cost: None,
                    frozen: None,
                    deleted: None,
                    added: None,
                    remarks: None,
                    committee: "內政".into(),
                },
                vector: None,
            })
            .collect()
    }

    fn uploader() -> BatchUploader {
        BatchUploader::new(100, 3, Duration::ZERO)
    }

    #[tokio::test]
    async fn splits_into_chunks_of_chunk_size() {
        let sink = RecordingSink::default();
        let uploaded = uploader().upload(&sink, &records(250)).await.unwrap();
        assert_eq!(uploaded, 250);
        assert_eq!(sink.calls(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn failed_chunk_is_retried_once_then_continues() {
        let sink = RecordingSink::failing([1]);
        uploader().upload(&sink, &records(250)).await.unwrap();
        assert_eq!(sink.calls(), vec![100, 100, 100, 50]);
    }

    #[tokio::test]
    async fn exhausted_retries_abort_the_upload() {
        let sink = RecordingSink::failing([1, 2, 3, 4]);
        let err = uploader().upload(&sink, &records(250)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UploadExhausted {
                chunk: 1,
                attempts: 4,
                ..
            }
        ));
        // First chunk, then four attempts at the second; the third is never sent.
        assert_eq!(sink.calls(), vec![100, 100, 100, 100, 100]);
    }

    #[tokio::test]
    async fn replace_all_clears_once() {
        let sink = RecordingSink::default();
        uploader().replace_all(&sink, &records(150)).await.unwrap();
        assert_eq!(*sink.clears.lock().unwrap(), 1);
        assert_eq!(sink.calls(), vec![100, 50]);
    }

    #[tokio::test]
    async fn empty_upload_sends_nothing() {
        let sink = RecordingSink::default();
        assert_eq!(uploader().upload(&sink, &[]).await.unwrap(), 0);
        assert!(sink.calls().is_empty());
    }
}
