//! Chat-completion client
//!
//! Talks to Azure OpenAI deployments, or to any OpenAI-compatible endpoint
//! when no deployment is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("No response choices returned")]
    EmptyResponse,

    #[error("Failed to parse model output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides; `None` falls back to configuration
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask for `response_format: json_object`
    pub json: bool,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Azure OpenAI / OpenAI-compatible chat client
pub struct AzureOpenAi {
    client: reqwest::Client,
    config: AiConfig,
}

impl AzureOpenAi {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn is_azure(&self) -> bool {
        !self.config.deployment.is_empty()
    }

    /// Chat completions URL for the configured endpoint
    pub fn completions_url(&self) -> String {
        let endpoint = self.config.endpoint.trim_end_matches('/');
        if self.is_azure() {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, self.config.deployment, self.config.api_version
            )
        } else {
            endpoint.to_string()
        }
    }
}

#[async_trait]
impl ChatModel for AzureOpenAi {
    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String, AiError> {
        if !self.config.is_configured() {
            return Err(AiError::NotConfigured);
        }

        let request = ChatRequest {
            model: (!self.is_azure()).then_some(self.config.model.as_str()),
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            response_format: options.json.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let builder = self.client.post(self.completions_url()).json(&request);
        let builder = if self.is_azure() {
            builder.header("api-key", &self.config.api_key)
        } else {
            builder.bearer_auth(&self.config.api_key)
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "AI API returned error");
            return Err(AiError::Api {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)?;

        debug!(len = content.len(), "Received AI response");
        Ok(content)
    }
}

/// Pull the JSON object out of a model reply.
///
/// Handles ```` ```json ```` fences and prose around the object.
pub fn extract_json(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let inner = match rest.rfind("```") {
            Some(end) => &rest[..end],
            None => rest,
        };
        return inner.trim().to_string();
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
pub mod testing {
    //! Canned chat model for service tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued replies in order, then repeats the fallback
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        fallback: Result<String, String>,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn always(reply: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Ok(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn then(self, reply: Result<&str, &str>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(reply.map(str::to_string).map_err(str::to_string));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage], _options: ChatOptions) -> Result<String, AiError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let next = self.replies.lock().unwrap().pop_front();
            match next.unwrap_or_else(|| self.fallback.clone()) {
                Ok(reply) => Ok(reply),
                Err(body) => Err(AiError::Api { status: 500, body }),
            }
        }
    }
}
