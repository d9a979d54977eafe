//! OpenAI-compatible chat-completion client for work-report summaries.
//!
//! Requests are plain non-streaming `POST {base_url}/chat/completions`
//! calls. The async client is driven from a private current-thread tokio
//! runtime so the rest of the crate stays synchronous.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AiConfig;
use crate::settings::{Namespace, SettingsStore};

/// Timeout used by [`ChatClient::verify_key`].
pub const KEY_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub const SETTINGS_NAMESPACE: &str = "settings";
pub const KEY_SETTING: &str = "key";
pub const ADDRESS_SETTING: &str = "address";
pub const MODEL_SETTING: &str = "model";
pub const PROMPT_SETTING: &str = "prompt";

/// Errors from the chat-completion client.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("API returned no choices")]
    NoChoices,

    #[error("API returned empty content")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Something that can turn commit history into prose.
pub trait Summarizer {
    fn summarize(&self, system_prompt: &str, user_text: &str) -> Result<String, AiError>;
}

/// Effective AI settings: config file values overridden by the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub prompt: String,
    pub timeout_secs: u64,
}

impl ChatSettings {
    pub fn resolve(config: &AiConfig, store: &SettingsStore) -> Self {
        let ns = Namespace::new(SETTINGS_NAMESPACE);
        Self {
            api_key: store.get(&ns, KEY_SETTING, ""),
            base_url: store.get(&ns, ADDRESS_SETTING, &config.base_url),
            model: store.get(&ns, MODEL_SETTING, &config.model),
            prompt: store.get(&ns, PROMPT_SETTING, &config.prompt),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Key, address and model must all be set.
    pub fn check_complete(&self) -> Result<(), AiError> {
        if self.api_key.trim().is_empty() {
            return Err(AiError::MissingSetting(KEY_SETTING));
        }
        if self.base_url.trim().is_empty() {
            return Err(AiError::MissingSetting(ADDRESS_SETTING));
        }
        if self.model.trim().is_empty() {
            return Err(AiError::MissingSetting(MODEL_SETTING));
        }
        Ok(())
    }

    /// API key with everything but the last four characters masked.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{visible}", "*".repeat(chars.len() - 4))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for the chat-completion endpoint.
pub struct ChatClient {
    inner: reqwest::Client,
    settings: ChatSettings,
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            inner: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim().trim_end_matches('/')
        )
    }

    /// Send a one-token `Hi` and report whether any content came back.
    pub fn verify_key(&self) -> Result<bool, AiError> {
        self.settings.check_complete()?;
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "Hi",
            }],
            stream: false,
            max_tokens: Some(1),
        };
        let response = block_on(self.complete(&request, KEY_CHECK_TIMEOUT))?;
        Ok(extract_reply(response).is_ok())
    }

    async fn complete(
        &self,
        request: &ChatRequest<'_>,
        timeout: Duration,
    ) -> Result<ChatResponse, AiError> {
        let url = self.endpoint();
        debug!(url = %url, model = %request.model, "POST chat completion");

        let response = self
            .inner
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

impl Summarizer for ChatClient {
    fn summarize(&self, system_prompt: &str, user_text: &str) -> Result<String, AiError> {
        if user_text.trim().is_empty() {
            return Err(AiError::EmptyInput);
        }
        self.settings.check_complete()?;

        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            stream: false,
            max_tokens: None,
        };
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let response = block_on(self.complete(&request, timeout))?;
        extract_reply(response)
    }
}

fn extract_reply(response: ChatResponse) -> Result<String, AiError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(AiError::NoChoices)?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(AiError::EmptyResponse),
    }
}

fn block_on<T, F>(future: F) -> Result<T, AiError>
where
    F: std::future::Future<Output = Result<T, AiError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AiError::Runtime(err.to_string()))?;
    runtime.block_on(future)
}
