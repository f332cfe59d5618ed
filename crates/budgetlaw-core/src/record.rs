//! Proposal records as they move through the extraction pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of one input document: the committee directory plus the file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId {
    pub committee: String,
    pub filename: String,
}

impl DocId {
    pub fn new(committee: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            committee: committee.into(),
            filename: filename.into(),
        }
    }

    /// Checkpoint key, `committee/filename`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.committee, self.filename)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.committee, self.filename)
    }
}

/// One self-contained proposal text cut from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub doc: DocId,
    /// Position within the document, starting at 0.
    pub index: usize,
    pub text: String,
}

/// Requested budget action. The set is closed: anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "照列")]
    Keep,
    #[serde(rename = "減列")]
    Reduce,
    #[serde(rename = "凍結")]
    Freeze,
    #[serde(rename = "增列")]
    Increase,
    #[serde(rename = "減列與凍結")]
    ReduceAndFreeze,
    #[serde(rename = "其他建議")]
    Other,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Keep,
        Action::Reduce,
        Action::Freeze,
        Action::Increase,
        Action::ReduceAndFreeze,
        Action::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "照列",
            Self::Reduce => "減列",
            Self::Freeze => "凍結",
            Self::Increase => "增列",
            Self::ReduceAndFreeze => "減列與凍結",
            Self::Other => "其他建議",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// An untyped record as returned by the oracle, before validation.
///
/// Consensus voting works on this shape so that disagreeing attempts can be
/// compared field by field even when some of them are invalid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub category: String,
    pub content: String,
    pub action: String,
    #[serde(default)]
    pub proposer: Option<Vec<String>>,
    #[serde(default)]
    pub co_signers: Option<Vec<String>>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub frozen: Option<f64>,
    #[serde(default)]
    pub deleted: Option<f64>,
    #[serde(default)]
    pub added: Option<f64>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl CandidateRecord {
    /// True if any amount field carries a value.
    pub fn has_amount(&self) -> bool {
        [self.cost, self.frozen, self.deleted, self.added]
            .iter()
            .any(Option::is_some)
    }
}

/// A validated proposal. Amounts are in 元.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub category: String,
    pub content: String,
    pub action: Action,
    #[serde(default)]
    pub proposer: Vec<String>,
    #[serde(default)]
    pub co_signers: Vec<String>,
    pub cost: Option<u64>,
    pub frozen: Option<u64>,
    pub deleted: Option<u64>,
    pub added: Option<u64>,
    pub remarks: Option<String>,
    pub committee: String,
}

impl ProposalRecord {
    /// Text sent to the embedding service: content, proposers and co-signers.
    pub fn embedding_text(&self) -> String {
        let mut lines = vec![
            self.content.clone(),
            format!("提案人：{}", self.proposer.join("、")),
        ];
        if !self.co_signers.is_empty() {
            lines.push(format!("連署人：{}", self.co_signers.join("、")));
        }
        lines.join("\n")
    }
}

/// A proposal paired with its embedding. `vector` is `None` when embedding failed.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: ProposalRecord,
    pub vector: Option<Vec<f32>>,
}
