//! Per-segment oracle calls with bounded retry.

use std::sync::Arc;

use budgetlaw_core::{CandidateRecord, Taxonomy};
use serde_json::Value;
use tracing::{debug, warn};

use crate::arithmetic;
use crate::oracle::{Oracle, OracleRequest, ToolSpec};
use crate::prompt::{self, RetryPolicy};

/// Turns one segment into candidate records. Never fails: exhaustion yields an empty list.
pub struct ExtractionClient {
    oracle: Arc<dyn Oracle>,
    taxonomy: Taxonomy,
    retry: RetryPolicy,
    output_schema: Value,
    tool: ToolSpec,
}

impl ExtractionClient {
    pub fn new(oracle: Arc<dyn Oracle>, taxonomy: Taxonomy) -> Self {
        let output_schema = prompt::output_schema(&taxonomy);
        Self {
            oracle,
            taxonomy,
            retry: RetryPolicy::default(),
            output_schema,
            tool: arithmetic::tool_spec(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn request(&self, instructions: String, segment_text: &str) -> OracleRequest {
        OracleRequest {
            categories: self.taxonomy.names().to_vec(),
            instructions,
            output_schema: self.output_schema.clone(),
            arithmetic_tool: Some(self.tool.clone()),
            require_arithmetic: arithmetic::mentions_scaled_unit(segment_text),
        }
    }

    /// Extract candidates from `segment_text`.
    ///
    /// `context` holds diagnostics from earlier rounds (validation rejections);
    /// they are included from the first prompt on. Generation errors are added
    /// to the diagnostics before retrying, transport errors back off instead.
    pub async fn extract(&self, segment_text: &str, context: &[String]) -> Vec<CandidateRecord> {
        let base = prompt::instructions(&self.taxonomy, segment_text);
        let mut errors = context.to_vec();
        let mut attempt = 0;

        while let Some(instructions) = self.retry.prompt(&base, attempt, &errors) {
            let request = self.request(instructions, segment_text);
            match self.oracle.generate(&request).await {
                Ok(records) => {
                    debug!(attempt, records = records.len(), "extraction succeeded");
                    return records;
                }
                Err(e) if e.is_generation_error() => {
                    warn!(attempt, error = %e, "oracle output rejected, retrying");
                    errors.push(e.to_string());
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "oracle call failed, retrying");
                    if attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.delay(attempt + 1)).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "oracle call failed permanently");
                    return Vec::new();
                }
            }
            attempt += 1;
        }

        warn!(
            attempts = attempt,
            last_error = errors.last().map(String::as_str).unwrap_or("transport"),
            "extraction retries exhausted"
        );
        Vec::new()
    }
}
