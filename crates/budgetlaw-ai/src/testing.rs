//! Scripted oracle for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use budgetlaw_core::CandidateRecord;

use crate::{AiError, Oracle, OracleRequest};

/// Replays queued responses in call order; returns an empty extraction once drained.
#[derive(Default)]
pub struct Scripted {
    script: Mutex<VecDeque<Result<Vec<CandidateRecord>, AiError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl Scripted {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<CandidateRecord>, AiError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for Scripted {
    async fn generate(&self, request: &OracleRequest) -> Result<Vec<CandidateRecord>, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A record that passes validation under the built-in taxonomy.
pub fn candidate(content: &str, frozen: Option<f64>) -> CandidateRecord {
    CandidateRecord {
        category: "內政部".to_string(),
        content: content.to_string(),
        action: if frozen.is_some() { "凍結" } else { "其他建議" }.to_string(),
        proposer: Some(vec!["王小明".to_string()]),
        frozen,
        ..Default::default()
    }
}
