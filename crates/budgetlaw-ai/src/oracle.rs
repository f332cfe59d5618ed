//! The structured-generation oracle seam.

use async_trait::async_trait;
use budgetlaw_core::CandidateRecord;
use serde::Serialize;

use crate::AiError;

/// A tool the oracle may call, described by a JSON schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One extraction request for one segment.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Closed category list the records must be filed under.
    pub categories: Vec<String>,
    /// Full natural-language prompt, segment text included.
    pub instructions: String,
    /// Strict JSON schema for the returned array of records.
    pub output_schema: serde_json::Value,
    pub arithmetic_tool: Option<ToolSpec>,
    /// The oracle must route amount conversions through `arithmetic_tool`.
    pub require_arithmetic: bool,
}

/// External service turning one segment into candidate records.
///
/// Implementations are not expected to be deterministic. They return an error
/// for transport failures and for output that does not match `output_schema`.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> Result<Vec<CandidateRecord>, AiError>;
}
