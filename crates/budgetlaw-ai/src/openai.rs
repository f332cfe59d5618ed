//! OpenAI chat-completions oracle and embeddings client.
//!
//! The oracle runs a tool loop: the model may call `calculate` any number of
//! times (executed locally) and finishes by calling `submit_proposals` with
//! arguments matching the strict output schema.

use std::time::Duration;

use async_trait::async_trait;
use budgetlaw_core::CandidateRecord;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::AiError;
use crate::arithmetic;
use crate::embedder::Embedder;
use crate::oracle::{Oracle, OracleRequest, ToolSpec};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const SUBMIT_TOOL: &str = "submit_proposals";

/// Thin authenticated JSON client for the OpenAI REST API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, AiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::Config("OpenAI API key is empty".into()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a compatible endpoint (proxy, Azure, local server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AiError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn chat(&self, body: &Value) -> Result<Value, AiError> {
        self.post("chat/completions", body).await
    }

    pub async fn embedding(&self, model: &str, input: &str) -> Result<Vec<f32>, AiError> {
        let reply = self
            .post("embeddings", &json!({ "model": model, "input": input }))
            .await?;
        let parsed: EmbeddingResponse = serde_json::from_value(reply)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::Schema("embedding response has no data".into()))
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Submission {
    proposals: Vec<CandidateRecord>,
}

enum Step {
    Continue,
    Submitted(Vec<CandidateRecord>),
}

/// Conversation state of one `generate` call.
struct ToolLoop {
    messages: Vec<Value>,
    calculations: usize,
    require_arithmetic: bool,
}

impl ToolLoop {
    fn new(request: &OracleRequest) -> Self {
        Self {
            messages: vec![json!({ "role": "user", "content": request.instructions })],
            calculations: 0,
            require_arithmetic: request.require_arithmetic,
        }
    }

    /// Apply one assistant message: run its tool calls and queue their replies.
    fn step(&mut self, message: Value) -> Result<Step, AiError> {
        let calls: Vec<ToolCall> = match message.get("tool_calls") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone())?,
            _ => Vec::new(),
        };
        if calls.is_empty() {
            return Err(AiError::Schema("reply did not call any tool".into()));
        }
        self.messages.push(message);

        let mut submitted = None;
        for call in calls {
            let reply = match call.function.name.as_str() {
                arithmetic::TOOL_NAME => {
                    self.calculations += 1;
                    arithmetic::run(&call.function.arguments)
                }
                SUBMIT_TOOL => {
                    let submission: Submission = serde_json::from_str(&call.function.arguments)
                        .map_err(|e| AiError::Schema(format!("{SUBMIT_TOOL} arguments: {e}")))?;
                    submitted = Some(submission.proposals);
                    json!({ "ok": true }).to_string()
                }
                other => json!({ "error": format!("unknown tool {other}") }).to_string(),
            };
            self.messages.push(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": reply,
            }));
        }

        let Some(proposals) = submitted else {
            return Ok(Step::Continue);
        };
        if self.require_arithmetic
            && self.calculations == 0
            && proposals.iter().any(CandidateRecord::has_amount)
        {
            return Err(AiError::ToolNotUsed);
        }
        Ok(Step::Submitted(proposals))
    }
}

fn function_tool(name: &str, description: &str, parameters: &Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
            "strict": true,
        }
    })
}

/// Oracle backed by chat completions with strict function calling.
pub struct OpenAiOracle {
    client: OpenAiClient,
    model: String,
    temperature: f32,
    max_turns: usize,
}

impl OpenAiOracle {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.0,
            max_turns: 8,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    fn body(&self, request: &OracleRequest, messages: &[Value]) -> Value {
        let submission = json!({
            "type": "object",
            "properties": { "proposals": request.output_schema },
            "required": ["proposals"],
            "additionalProperties": false,
        });
        let mut tools = vec![function_tool(
            SUBMIT_TOOL,
            "提交本段落解析出的全部提案。",
            &submission,
        )];
        if let Some(ToolSpec {
            name,
            description,
            parameters,
        }) = &request.arithmetic_tool
        {
            tools.push(function_tool(name, description, parameters));
        }

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
            "tools": tools,
            "tool_choice": "required",
            "parallel_tool_calls": false,
        })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<Vec<CandidateRecord>, AiError> {
        let mut tool_loop = ToolLoop::new(request);
        for turn in 0..self.max_turns {
            let reply = self
                .client
                .chat(&self.body(request, &tool_loop.messages))
                .await?;
            let message = reply
                .pointer("/choices/0/message")
                .cloned()
                .ok_or_else(|| AiError::Schema("response has no choices".into()))?;

            match tool_loop.step(message)? {
                Step::Submitted(proposals) => {
                    debug!(
                        turn,
                        calculations = tool_loop.calculations,
                        proposals = proposals.len(),
                        "proposals submitted"
                    );
                    return Ok(proposals);
                }
                Step::Continue => debug!(turn, "tool turn"),
            }
        }
        Err(AiError::TooManyTurns(self.max_turns))
    }
}

/// Embedder backed by the embeddings endpoint.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>, dim: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dim,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.client.embedding(&self.model, text).await
    }
}
