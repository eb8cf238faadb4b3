pub mod openai;

use async_trait::async_trait;
use log::warn;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use self::openai::OpenAIChatClient;
use crate::cli::Args;
use crate::models::chat::ChatMessage;

/// Returned to the user when the upstream answers with empty content.
pub const FALLBACK_REPLY: &str = "Sorry, I had trouble responding.";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream returned status {status}: {message}")]
    Status {
        status: u16,
        message: String,
    },
    #[error("upstream transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub history_window: usize,
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.trim().is_empty()),
            model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            temperature: args.chat_temperature,
            max_tokens: args.chat_max_tokens,
            timeout: Duration::from_secs(args.chat_timeout_secs),
            history_window: args.history_window,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the system prompt, a bounded window of recent history and the
    /// new user message, and returns the generated reply text.
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str
    ) -> Result<String, UpstreamError>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Returns None when no upstream credential is configured. The server
/// still boots; chat requests are rejected until an operator sets a key.
pub fn initialize_chat_client(args: &Args) -> Option<Arc<dyn ChatClient>> {
    let config = LlmConfig::from_args(args);
    if config.api_key.is_none() {
        warn!("No chat API key configured. Chat requests will be rejected until CHAT_API_KEY is set.");
        return None;
    }

    match new_client(&config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Failed to initialize chat client: {}", e);
            None
        }
    }
}
