//! LanceDB destination for enriched proposals.

use std::path::Path;
use std::sync::Arc;

use arrow::array::RecordBatchIterator;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use budgetlaw_core::{EnrichedRecord, proposals};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::info;

use crate::StoreError;
use crate::batch::{SearchHit, from_batch, to_batch};
use crate::upload::RecordSink;

/// The `proposals` table of one LanceDB database directory.
pub struct LanceStore {
    db: lancedb::Connection,
    table: String,
    dim: i32,
}

impl LanceStore {
    /// Connect to the database at `path`, creating it if needed.
    pub async fn open(path: &Path, dim: usize) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let dim = i32::try_from(dim)
            .map_err(|_| StoreError::Other(format!("embedding dimension {dim} is too large")))?;
        let db = lancedb::connect(uri).execute().await?;
        Ok(Self {
            db,
            table: proposals::TABLE.to_string(),
            dim,
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.db.table_names().execute().await?)
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.table_names().await?.contains(&self.table))
    }

    async fn create_empty(&self) -> Result<lancedb::Table, StoreError> {
        let table = self
            .db
            .create_empty_table(&self.table, Arc::new(proposals::schema(self.dim)))
            .execute()
            .await?;
        Ok(table)
    }

    async fn open_or_create(&self) -> Result<lancedb::Table, StoreError> {
        if self.exists().await? {
            Ok(self.db.open_table(&self.table).execute().await?)
        } else {
            self.create_empty().await
        }
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        if !self.exists().await? {
            return Ok(0);
        }
        let table = self.db.open_table(&self.table).execute().await?;
        Ok(table.count_rows(None).await?)
    }

    /// The `limit` proposals nearest to `query`, closest first.
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let table = self.db.open_table(&self.table).execute().await?;
        let batches: Vec<RecordBatch> = table
            .vector_search(query)?
            .limit(limit)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(from_batch(batch)?);
        }
        Ok(hits)
    }
}

#[async_trait]
impl RecordSink for LanceStore {
    async fn clear(&self) -> Result<(), StoreError> {
        if self.exists().await? {
            self.db.drop_table(&self.table, &[]).await?;
        }
        self.create_empty().await?;
        info!(table = %self.table, "cleared table");
        Ok(())
    }

    async fn insert(&self, records: &[EnrichedRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let batch = to_batch(records, self.dim)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self.open_or_create().await?;
        table.add(Box::new(reader)).execute().await?;
        Ok(())
    }
}
