//! Embedding enrichment of validated proposals.

use async_trait::async_trait;
use budgetlaw_core::{BoundedPool, EnrichedRecord, ProposalRecord, Progress};
use tracing::{info, warn};

use crate::AiError;

/// Produces fixed-width sentence vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Width of every vector this embedder returns.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;
}

/// Embed every record, at most `pool.limit()` calls at once, preserving order.
///
/// A failed call or a vector of the wrong width leaves that record's vector
/// empty; the record itself is always kept.
pub async fn enrich(
    embedder: &dyn Embedder,
    records: Vec<ProposalRecord>,
    pool: BoundedPool,
) -> Vec<EnrichedRecord> {
    let progress = Progress::new(records.len());
    let dim = embedder.dim();

    let tasks = records.into_iter().map(|record| {
        let progress = &progress;
        async move {
            let vector = match embedder.embed(&record.embedding_text()).await {
                Ok(v) if v.len() == dim => Some(v),
                Ok(v) => {
                    warn!(expected = dim, got = v.len(), "embedding has wrong dimension");
                    None
                }
                Err(e) => {
                    warn!(error = %e, category = %record.category, "embedding failed");
                    None
                }
            };

            let done = progress.advance();
            if done % 100 == 0 || done == progress.total() {
                info!(done, total = progress.total(), "embedded records");
            }
            EnrichedRecord { record, vector }
        }
    });

    pool.collect_ordered(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetlaw_core::Action;

    /// Three-wide vectors derived from text length; fails on texts containing 失敗.
    struct FakeEmbedder {
        width: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dim(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
            if text.contains("失敗") {
                return Err(AiError::Api {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(vec![text.chars().count() as f32; self.width])
        }
    }

    fn record(content: &str) -> ProposalRecord {
        ProposalRecord {
            category: "內政部".into(),
            content: content.into(),
            action: Action::Other,
            proposer: vec!["王小明".into()],
            co_signers: vec![],
            cost: None,
            frozen: None,
            deleted: None,
            added: None,
            remarks: None,
            committee: "內政".into(),
        }
    }

    #[tokio::test]
    async fn keeps_order_and_vectors() {
        let records = vec![record("甲"), record("乙乙")];
        let enriched = enrich(&FakeEmbedder { width: 3 }, records, BoundedPool::new(4)).await;
        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].record.content, "甲");
        assert_eq!(enriched[1].record.content, "乙乙");
        let first = enriched[0].vector.as_ref().unwrap();
        assert_eq!(first.len(), 3);
        // "甲\n提案人：王小明"
        assert_eq!(first[0], 9.0);
    }

    #[tokio::test]
    async fn failure_yields_null_vector() {
        let records = vec![record("甲"), record("失敗"), record("丙")];
        let enriched = enrich(&FakeEmbedder { width: 3 }, records, BoundedPool::new(2)).await;
        assert_eq!(enriched.len(), 3);
        assert!(enriched[0].vector.is_some());
        assert!(enriched[1].vector.is_none());
        assert!(enriched[2].vector.is_some());
    }

    #[tokio::test]
    async fn wrong_dimension_yields_null_vector() {
        let enriched = enrich(&FakeEmbedder { width: 5 }, vec![record("甲")], BoundedPool::new(1)).await;
        assert!(enriched[0].vector.is_none());
    }
}
