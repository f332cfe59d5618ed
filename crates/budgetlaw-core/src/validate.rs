//! Closed-schema validation of oracle candidates.

use thiserror::Error;

use crate::record::{Action, CandidateRecord, ProposalRecord};
use crate::segment::strip_ordinal_marker;
use crate::taxonomy::Taxonomy;

/// Largest amount representable exactly in the oracle's JSON numbers.
const MAX_AMOUNT: f64 = 9_007_199_254_740_992.0;

/// Why a candidate was rejected. The message is fed back to the oracle on resubmission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("category {0:?} is not one of the allowed categories")]
    UnknownCategory(String),

    #[error("content is empty")]
    EmptyContent,

    #[error("action {0:?} is not one of 照列, 減列, 凍結, 增列, 減列與凍結, 其他建議")]
    UnknownAction(String),

    #[error("{field} = {value} is not a non-negative whole number of 元")]
    InvalidAmount { field: &'static str, value: f64 },
}

/// Accepts or rejects whole candidates against the taxonomy and the action enum.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    taxonomy: Taxonomy,
}

impl ValidationGate {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Validate `candidate` and turn it into a [`ProposalRecord`] for `committee`.
    ///
    /// Checks run in order: category, content, action, amounts. The first
    /// failure rejects the whole record.
    pub fn validate(
        &self,
        candidate: &CandidateRecord,
        committee: &str,
    ) -> Result<ProposalRecord, Rejection> {
        let category = candidate.category.trim();
        if !self.taxonomy.contains(category) {
            return Err(Rejection::UnknownCategory(candidate.category.clone()));
        }

        let content = strip_ordinal_marker(candidate.content.trim()).trim();
        if content.is_empty() {
            return Err(Rejection::EmptyContent);
        }

        let action: Action = candidate
            .action
            .parse()
            .map_err(Rejection::UnknownAction)?;

        Ok(ProposalRecord {
            category: category.to_string(),
            content: content.to_string(),
            action,
            proposer: clean_names(candidate.proposer.as_deref()),
            co_signers: clean_names(candidate.co_signers.as_deref()),
            cost: amount("cost", candidate.cost)?,
            frozen: amount("frozen", candidate.frozen)?,
            deleted: amount("deleted", candidate.deleted)?,
            added: amount("added", candidate.added)?,
            remarks: candidate
                .remarks
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            committee: committee.to_string(),
        })
    }
}

fn amount(field: &'static str, value: Option<f64>) -> Result<Option<u64>, Rejection> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= MAX_AMOUNT => {
            Ok(Some(v as u64))
        }
        Some(v) => Err(Rejection::InvalidAmount { field, value: v }),
    }
}

fn clean_names(names: Option<&[String]>) -> Vec<String> {
    names
        .unwrap_or_default()
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}
