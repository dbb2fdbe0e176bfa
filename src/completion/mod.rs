// Completion module
// OpenAI-compatible chat completions used by the query router


use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::CompletionConfig;
use crate::http::request_with_retry;
use crate::{RagError, Result};

/// A completion is not idempotent, so transport failures are never retried
const COMPLETION_ATTEMPTS: u32 = 1;

/// Answers a user prompt under a system instruction
///
/// Failures surface as [`RagError::CompletionUnavailable`]; an answer is
/// never fabricated.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    api_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl CompletionClient {
    #[inline]
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| RagError::Config(format!("Invalid completion URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            api_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            agent,
        })
    }

    fn build_request<'a>(&'a self, system: &str, prompt: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        }
    }

    /// Send one chat completion request and return the first choice's text
    #[inline]
    pub fn complete_blocking(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let request_json = serde_json::to_string(&self.build_request(system, prompt))
            .context("Failed to serialize completion request")?;

        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.api_url,
            prompt.len()
        );

        let bearer = format!("Bearer {}", self.api_key);
        let response_text = request_with_retry(self.api_url.as_str(), COMPLETION_ATTEMPTS, || {
            let mut request = self
                .agent
                .post(self.api_url.as_str())
                .header("Content-Type", "application/json");
            if !self.api_key.is_empty() {
                request = request.header("Authorization", bearer.as_str());
            }
            request
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Completion request failed")?;

        parse_completion(&response_text)
    }
}

fn parse_completion(response_text: &str) -> anyhow::Result<String> {
    let response: ChatResponse =
        serde_json::from_str(response_text).context("Failed to parse completion response")?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow::anyhow!("Completion response contained no message content"))
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    #[inline]
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let client = self.clone();
        let system = system.to_string();
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || client.complete_blocking(&system, &prompt))
            .await
            .map_err(|e| RagError::CompletionUnavailable(format!("completion task failed: {e}")))?
            .map_err(|e| RagError::CompletionUnavailable(format!("{e:#}")))
    }
}
