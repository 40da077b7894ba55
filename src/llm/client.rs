//! Anthropic Messages API client.
//!
//! The conversation with the model is an explicit, append-only list of
//! role-tagged messages. Every call sends the entire transcript so far,
//! which is what makes iterative repair effective: the model sees each
//! failed candidate alongside the feedback it produced.

use crate::config::Config;
use serde::{Deserialize, Serialize};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

/// An append-only transcript of the exchange with the model.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role: role.as_str(),
            content: content.into(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

/// Reply content blocks. Anything that is not plain text (tool use,
/// thinking, future block kinds) is a distinct variant so the caller
/// hits an explicit error path instead of probing attributes.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    /// Build a client from config, failing when no API key is available.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.get_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured. Set ANTHROPIC_API_KEY or add it to {}.",
                Config::config_location()
            )
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Send the full transcript and return the model's text reply.
    /// Retries rate-limit and overloaded responses with exponential backoff.
    pub async fn send(&self, conversation: &Conversation) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: &conversation.messages,
        };

        let mut last_error = String::new();
        let mut retry_count = 0;

        while retry_count <= MAX_RETRIES {
            let response = self
                .http
                .post(ANTHROPIC_URL)
                .header("Content-Type", "application/json")
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!("Failed to parse model response: {}\n{}", e, truncate_str(&text, 400))
                })?;
                return reply_text(parsed);
            }

            last_error = text.clone();

            // 429 = rate limited, 529 = overloaded; both are worth retrying
            if (status.as_u16() == 429 || status.as_u16() == 529) && retry_count < MAX_RETRIES {
                retry_count += 1;
                let backoff_secs =
                    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count - 1)) / 1000;
                eprintln!(
                    "  Model API busy ({}). Retrying in {}s (attempt {}/{})",
                    status, backoff_secs, retry_count, MAX_RETRIES
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(backoff_secs)).await;
                continue;
            }

            let error_msg = match status.as_u16() {
                401 => "Invalid API key. Check ANTHROPIC_API_KEY.".to_string(),
                429 => format!(
                    "Rate limited after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "Model API server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, truncate_str(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", error_msg));
        }

        Err(anyhow::anyhow!("{}", last_error))
    }
}

/// Collapse a parsed response into its text reply, rejecting anything else.
fn reply_text(response: ChatResponse) -> anyhow::Result<String> {
    if response.content.len() != 1 {
        return Err(anyhow::anyhow!(
            "Unexpected response shape: {} content blocks",
            response.content.len()
        ));
    }
    match response.content.into_iter().next() {
        Some(ContentBlock::Text { text }) => Ok(text),
        _ => Err(anyhow::anyhow!("Model returned a non-text reply")),
    }
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
