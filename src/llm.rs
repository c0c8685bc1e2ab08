use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

/// User-role instruction for the chat flow.
pub const ANSWER_INSTRUCTION: &str = "Can you answer  the following with bullet points?";

/// User-role instruction for the OCR flow.
pub const SUMMARY_INSTRUCTION: &str = "Can you summarize the following into bulleted points?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

/// The fixed two-message prompt: system prompt, then the instruction with the
/// input text on the following line.
pub fn build_prompt(system_prompt: &str, instruction: &str, text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!("{}\n{}", instruction, text)),
    ]
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Anything that can turn a prompt into a single reply.
#[async_trait]
pub trait Completion: Send + Sync {
    /// System prompt to pair with every request.
    fn system_prompt(&self) -> &str;

    /// Returns the content of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Sends `instruction` + `text` as the user turn and returns the reply.
    async fn ask(&self, instruction: &str, text: &str) -> Result<String> {
        let messages = build_prompt(self.system_prompt(), instruction, text);
        self.complete(&messages).await
    }
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Completion for LlmClient {
    fn system_prompt(&self) -> &str {
        &self.config.system_prompt
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending completion request to {} ({})", url, self.config.provider);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to the completion API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion API response")?;

        first_choice_content(chat_response)
    }
}

fn first_choice_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .context("No choices in completion API response")
}
