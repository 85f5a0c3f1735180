//! Planning service client
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint (OpenAI,
//! Ollama, LiteLLM, vLLM). The model is asked for a JSON object which is
//! parsed into a [`PlanProposal`].

use super::models::{ChatMessage, PlanProposal};
use super::prompt::{build_messages, PromptMessage};
use crate::store::ProjectGraph;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("planner is not configured")]
    Disabled,

    #[error("failed to reach planner: {0}")]
    Request(#[from] reqwest::Error),

    #[error("planner error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("planner returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Source of plan proposals
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(
        &self,
        graph: &ProjectGraph,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<PlanProposal, PlannerError>;
}

#[derive(Clone)]
pub struct HttpPlanGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpPlanGenerator {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlannerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Strip a Markdown code fence some models wrap around JSON output
fn unfence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the assistant message into a proposal
pub fn parse_proposal(content: &str) -> Result<PlanProposal, PlannerError> {
    serde_json::from_str(unfence(content))
        .map_err(|e| PlannerError::InvalidResponse(format!("{e}")))
}

#[async_trait]
impl PlanGenerator for HttpPlanGenerator {
    async fn generate(
        &self,
        graph: &ProjectGraph,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<PlanProposal, PlannerError> {
        let messages = build_messages(graph, history, prompt);
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            temperature: 0.2,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map_or(body, |d| d.message);
            return Err(PlannerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| PlannerError::InvalidResponse(format!("{e}")))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PlannerError::InvalidResponse("empty completion".to_string()))?;

        let proposal = parse_proposal(&content)?;
        debug!(
            project_id = graph.project_id,
            upserts = proposal.task_upserts.len(),
            deletions = proposal.task_deletions.len(),
            requires_changes = proposal.requires_changes,
            "Plan proposal generated"
        );
        Ok(proposal)
    }
}
