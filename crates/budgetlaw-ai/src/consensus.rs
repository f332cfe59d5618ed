//! Reconciling repeated extractions of one segment into validated records.
//!
//! In frequency-vote mode the segment is extracted several times. The first
//! non-empty attempt (by attempt index) is the baseline and fixes how many
//! records there are and their text. The amounts and the action of each record
//! are then decided by majority across every attempt that has a record at the
//! same position, with ties going to the value seen first.

use budgetlaw_core::{
    BoundedPool, CandidateRecord, ProposalRecord, Rejection, Segment, ValidationGate,
};
use tracing::{debug, info, warn};

use crate::extract::ExtractionClient;

/// How many characters of a rejected record's content are quoted back to the oracle.
const QUOTE_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusMode {
    /// Extract `attempts` times and vote on amounts and action.
    FrequencyVote { attempts: usize },
    /// One extraction per round, no voting.
    SingleWithRetry,
}

impl Default for ConsensusMode {
    fn default() -> Self {
        Self::FrequencyVote { attempts: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusConfig {
    pub mode: ConsensusMode,
    /// Extraction attempts in flight at once for one segment.
    pub attempt_concurrency: usize,
    /// Resubmissions after a round in which some record failed validation.
    pub validation_retries: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            mode: ConsensusMode::default(),
            attempt_concurrency: 3,
            validation_retries: 2,
        }
    }
}

pub struct ConsensusResolver {
    client: ExtractionClient,
    gate: ValidationGate,
    config: ConsensusConfig,
}

impl ConsensusResolver {
    pub fn new(client: ExtractionClient, gate: ValidationGate, config: ConsensusConfig) -> Self {
        Self {
            client,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// One round of extraction under the configured mode.
    async fn round(&self, text: &str, context: &[String]) -> Vec<CandidateRecord> {
        match self.config.mode {
            ConsensusMode::SingleWithRetry => self.client.extract(text, context).await,
            ConsensusMode::FrequencyVote { attempts } => {
                let tasks = (0..attempts.max(1)).map(|_| self.client.extract(text, context));
                let results = BoundedPool::new(self.config.attempt_concurrency)
                    .collect_ordered(tasks)
                    .await;
                vote(&results)
            }
        }
    }

    /// Resolve `segment` into validated records.
    ///
    /// When a round produces a record the gate rejects, the whole segment is
    /// resubmitted with the rejection reasons as context. Once resubmissions
    /// are spent, or a resubmission comes back empty, the largest accepted set
    /// of any round is kept and the rest is dropped.
    pub async fn resolve(&self, segment: &Segment) -> Vec<ProposalRecord> {
        let committee = segment.doc.committee.as_str();
        let mut context: Vec<String> = Vec::new();
        let mut best: Vec<ProposalRecord> = Vec::new();
        let mut round = 0;

        loop {
            let candidates = self.round(&segment.text, &context).await;
            if candidates.is_empty() {
                if round == 0 {
                    warn!(doc = %segment.doc, segment = segment.index, "no proposals extracted");
                } else {
                    warn!(
                        doc = %segment.doc,
                        segment = segment.index,
                        round,
                        records = best.len(),
                        "resubmission came back empty, keeping earlier records"
                    );
                }
                return best;
            }

            let mut accepted = Vec::with_capacity(candidates.len());
            let mut rejected: Vec<(&CandidateRecord, Rejection)> = Vec::new();
            for candidate in &candidates {
                match self.gate.validate(candidate, committee) {
                    Ok(record) => accepted.push(record),
                    Err(reason) => rejected.push((candidate, reason)),
                }
            }

            if rejected.is_empty() {
                debug!(
                    doc = %segment.doc,
                    segment = segment.index,
                    records = accepted.len(),
                    round,
                    "segment resolved"
                );
                return accepted;
            }

            if round >= self.config.validation_retries {
                for (candidate, reason) in &rejected {
                    warn!(
                        doc = %segment.doc,
                        segment = segment.index,
                        content = %quote(&candidate.content),
                        %reason,
                        "dropping invalid record"
                    );
                }
                return if accepted.len() >= best.len() {
                    accepted
                } else {
                    best
                };
            }

            info!(
                doc = %segment.doc,
                segment = segment.index,
                rejected = rejected.len(),
                round,
                "resubmitting segment after validation failures"
            );
            context.extend(
                rejected
                    .iter()
                    .map(|(candidate, reason)| format!("「{}」：{reason}", quote(&candidate.content))),
            );
            if accepted.len() >= best.len() {
                best = accepted;
            }
            round += 1;
        }
    }
}

fn quote(content: &str) -> String {
    content.trim().chars().take(QUOTE_CHARS).collect()
}

/// Frequency vote over extraction attempts, given in attempt-index order.
///
/// Returns the baseline's records with `cost`, `frozen`, `deleted`, `added`
/// and `action` replaced by the majority value at each position. Lists and
/// text come from the baseline unchanged.
pub fn vote(attempts: &[Vec<CandidateRecord>]) -> Vec<CandidateRecord> {
    let Some(baseline) = attempts.iter().find(|a| !a.is_empty()) else {
        return Vec::new();
    };

    baseline
        .iter()
        .enumerate()
        .map(|(position, base)| {
            let peers: Vec<&CandidateRecord> =
                attempts.iter().filter_map(|a| a.get(position)).collect();

            let action = most_frequent(peers.iter().map(|r| r.action.trim()))
                .map(str::to_string)
                .unwrap_or_else(|| base.action.clone());

            CandidateRecord {
                action,
                cost: most_frequent(peers.iter().map(|r| r.cost)).unwrap_or(base.cost),
                frozen: most_frequent(peers.iter().map(|r| r.frozen)).unwrap_or(base.frozen),
                deleted: most_frequent(peers.iter().map(|r| r.deleted)).unwrap_or(base.deleted),
                added: most_frequent(peers.iter().map(|r| r.added)).unwrap_or(base.added),
                ..base.clone()
            }
        })
        .collect()
}

/// Most frequent value; on a tie the one seen first wins.
fn most_frequent<T: PartialEq>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for value in values {
        match tally.iter().position(|(seen, _)| *seen == value) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((value, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in tally {
        if best.as_ref().is_none_or(|(_, top)| count > *top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use budgetlaw_core::{Action, DocId, Segmenter, Taxonomy};

    use super::*;
    use crate::prompt::RetryPolicy;
    use crate::testing::{Scripted, candidate};

    fn with_cost(cost: f64) -> CandidateRecord {
        CandidateRecord {
            cost: Some(cost),
            ..candidate("甲", None)
        }
    }

    fn resolver(oracle: Arc<Scripted>, mode: ConsensusMode) -> ConsensusResolver {
        let client = ExtractionClient::new(oracle, Taxonomy::builtin())
            .with_retry(RetryPolicy::new(0, Duration::ZERO));
        let config = ConsensusConfig {
            mode,
            attempt_concurrency: 1,
            validation_retries: 2,
        };
        ConsensusResolver::new(client, ValidationGate::new(Taxonomy::builtin()), config)
    }

    fn segment(text: &str) -> Segment {
        Segment {
            doc: DocId::new("國安局", "report.md"),
            index: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn majority_amount_wins() {
        let attempts = vec![
            vec![with_cost(100.0)],
            vec![with_cost(100.0)],
            vec![with_cost(200.0)],
        ];
        assert_eq!(vote(&attempts)[0].cost, Some(100.0));
    }

    #[test]
    fn no_repeats_falls_back_to_first_attempt() {
        let attempts = vec![
            vec![with_cost(100.0)],
            vec![with_cost(200.0)],
            vec![with_cost(300.0)],
        ];
        assert_eq!(vote(&attempts)[0].cost, Some(100.0));
    }

    #[test]
    fn null_counts_as_a_vote() {
        let attempts = vec![
            vec![candidate("甲", None)],
            vec![candidate("甲", Some(5.0))],
            vec![candidate("甲", None)],
        ];
        let voted = vote(&attempts);
        assert_eq!(voted[0].frozen, None);
        assert_eq!(voted[0].action, "其他建議");
    }

    #[test]
    fn baseline_is_first_non_empty_attempt() {
        let attempts = vec![
            vec![],
            vec![candidate("乙", None), candidate("丙", None)],
            vec![candidate("丁", None)],
        ];
        let voted = vote(&attempts);
        assert_eq!(voted.len(), 2);
        assert_eq!(voted[0].content, "乙");
        assert_eq!(voted[1].content, "丙");
    }

    #[test]
    fn votes_are_positional() {
        let attempts = vec![
            vec![with_cost(1.0), with_cost(10.0)],
            vec![with_cost(2.0), with_cost(20.0)],
            vec![with_cost(2.0)],
        ];
        let voted = vote(&attempts);
        assert_eq!(voted[0].cost, Some(2.0));
        // Only the first two attempts have a second record; tie goes to the first.
        assert_eq!(voted[1].cost, Some(10.0));
    }

    #[test]
    fn action_votes_ignore_surrounding_whitespace() {
        let mut padded = candidate("甲", Some(1.0));
        padded.action = " 凍結 ".into();
        let attempts = vec![
            vec![candidate("甲", None)],
            vec![padded],
            vec![candidate("甲", Some(1.0))],
        ];
        assert_eq!(vote(&attempts)[0].action, "凍結");
    }

    #[test]
    fn all_empty_attempts_vote_nothing() {
        assert!(vote(&[vec![], vec![], vec![]]).is_empty());
        assert!(vote(&[]).is_empty());
    }

    #[tokio::test]
    async fn resolver_votes_across_attempts() {
        let oracle = Arc::new(Scripted::new([
            Ok(vec![with_cost(100.0)]),
            Ok(vec![with_cost(200.0)]),
            Ok(vec![with_cost(200.0)]),
        ]));
        let records = resolver(oracle.clone(), ConsensusMode::FrequencyVote { attempts: 3 })
            .resolve(&segment("(一)甲"))
            .await;
        assert_eq!(oracle.calls(), 3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cost, Some(200));
        assert_eq!(records[0].committee, "國安局");
    }

    #[tokio::test]
    async fn invalid_category_triggers_resubmission() {
        let bad = CandidateRecord {
            category: "警政署".into(),
            ..candidate("甲", None)
        };
        let oracle = Arc::new(Scripted::new([
            Ok(vec![bad]),
            Ok(vec![candidate("甲", None)]),
        ]));
        let records = resolver(oracle.clone(), ConsensusMode::SingleWithRetry)
            .resolve(&segment("(一)甲"))
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "內政部");

        let requests = oracle.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].instructions.contains("警政署"));
    }

    #[tokio::test]
    async fn exhausted_resubmissions_keep_valid_records() {
        let bad = CandidateRecord {
            action: "刪除".into(),
            ..candidate("乙", None)
        };
        let round = || -> Result<Vec<CandidateRecord>, crate::AiError> {
            Ok(vec![candidate("甲", None), bad.clone()])
        };
        let oracle = Arc::new(Scripted::new([round(), round(), round()]));
        let records = resolver(oracle.clone(), ConsensusMode::SingleWithRetry)
            .resolve(&segment("(一)甲"))
            .await;
        assert_eq!(oracle.calls(), 3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "甲");
    }

    #[tokio::test]
    async fn empty_resubmission_keeps_earlier_valid_records() {
        let bad = CandidateRecord {
            action: "刪除".into(),
            ..candidate("乙", None)
        };
        let oracle = Arc::new(Scripted::new([Ok(vec![candidate("甲", None), bad])]));
        let records = resolver(oracle.clone(), ConsensusMode::SingleWithRetry)
            .resolve(&segment("(一)甲"))
            .await;
        assert_eq!(oracle.calls(), 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "甲");
    }

    #[tokio::test]
    async fn smaller_final_round_does_not_replace_earlier_records() {
        let bad = || CandidateRecord {
            category: "警政署".into(),
            ..candidate("丙", None)
        };
        let oracle = Arc::new(Scripted::new([
            Ok(vec![candidate("甲", None), candidate("乙", None), bad()]),
            Ok(vec![bad()]),
            Ok(vec![candidate("甲", None), bad()]),
        ]));
        let records = resolver(oracle.clone(), ConsensusMode::SingleWithRetry)
            .resolve(&segment("(一)甲"))
            .await;
        assert_eq!(oracle.calls(), 3);
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["甲", "乙"]);
    }

    #[tokio::test]
    async fn empty_extraction_is_a_soft_failure() {
        let oracle = Arc::new(Scripted::default());
        let records = resolver(oracle, ConsensusMode::FrequencyVote { attempts: 3 })
            .resolve(&segment("(一)甲"))
            .await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn freeze_proposal_end_to_end() {
        let text = "(一)為加強國安管理，建議將相關預算凍結50萬元。\n\n提案人：王小明\n\n連署人：李大華、張三";
        let segments = Segmenter.split(&DocId::new("國安局", "report.md"), text);
        assert_eq!(segments.len(), 1);

        let extracted = CandidateRecord {
            category: "國安局".into(),
            content: "(一)為加強國安管理，建議將相關預算凍結50萬元。".into(),
            action: "凍結".into(),
            proposer: Some(vec!["王小明".into()]),
            co_signers: Some(vec!["李大華".into(), "張三".into()]),
            cost: None,
            frozen: Some(500_000.0),
            deleted: None,
            added: None,
            remarks: None,
        };
        let oracle = Arc::new(Scripted::new((0..3).map(|_| Ok(vec![extracted.clone()]))));
        let records = resolver(oracle.clone(), ConsensusMode::default())
            .resolve(&segments[0])
            .await;

        assert!(oracle.requests().iter().all(|r| r.require_arithmetic));
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.action, Action::Freeze);
        assert_eq!(record.frozen, Some(500_000));
        assert_eq!(record.cost, None);
        assert_eq!(record.proposer, vec!["王小明"]);
        assert_eq!(record.co_signers, vec!["李大華", "張三"]);
        assert_eq!(record.content, "為加強國安管理，建議將相關預算凍結50萬元。");
    }
}
