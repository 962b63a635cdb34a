//! Text-generation collaborators.
//!
//! The planner and the summarizer each talk to an [`LlmClient`]. Providers:
//! - `openai` and `groq`: [`OpenAiCompatibleClient`] against their
//!   chat-completions endpoints
//! - `static`: [`StaticLlm`], a canned reply for tests and offline runs

mod openai;

pub use openai::{OpenAiCompatibleClient, GROQ_BASE_URL, OPENAI_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::utils::{HttpClient, RetryConfig, Retryable, TransientError};

/// Reply of [`StaticLlm`] when none is configured
pub const DEFAULT_STATIC_RESPONSE: &str = "This is a static response.";

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of a chat exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-style text generator
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the messages and return the model's reply text
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Errors from LLM providers
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),
}

impl Retryable for LlmError {
    fn transient(&self) -> Option<TransientError> {
        match self {
            LlmError::Http(err) => TransientError::from_reqwest_error(err),
            LlmError::Api { status, .. } => TransientError::from_status(*status, None),
            LlmError::RateLimited { retry_after } => Some(TransientError::RateLimit(*retry_after)),
            _ => None,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    Static,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "groq" => Ok(LlmProvider::Groq),
            "static" => Ok(LlmProvider::Static),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Groq => "groq",
            LlmProvider::Static => "static",
        };
        f.write_str(name)
    }
}

/// An LLM that always answers with the same text
#[derive(Debug, Clone)]
pub struct StaticLlm {
    response: String,
}

impl StaticLlm {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for StaticLlm {
    fn default() -> Self {
        Self::new(DEFAULT_STATIC_RESPONSE)
    }
}

#[async_trait]
impl LlmClient for StaticLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }
}

/// Build the client for `provider` using `model`
pub fn build_llm(
    provider: LlmProvider,
    config: &LlmConfig,
    model: &str,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    let (base_url, api_key, key_name) = match provider {
        LlmProvider::Static => {
            let response = config
                .static_response
                .clone()
                .unwrap_or_else(|| DEFAULT_STATIC_RESPONSE.to_string());
            return Ok(Arc::new(StaticLlm::new(response)));
        }
        LlmProvider::OpenAi => (OPENAI_BASE_URL, &config.openai_api_key, "OPENAI_API_KEY"),
        LlmProvider::Groq => (GROQ_BASE_URL, &config.groq_api_key, "GROQ_API_KEY"),
    };

    let api_key = api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or(LlmError::MissingApiKey(key_name))?;

    tracing::debug!("Using {} model '{}'", provider, model);
    let http = HttpClient::new(config.request_timeout())?;
    Ok(Arc::new(
        OpenAiCompatibleClient::new(http, base_url, api_key, model)
            .with_retry(RetryConfig::attempts(config.max_attempts)),
    ))
}
