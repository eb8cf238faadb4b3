#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

pub mod console;

use serde::{ Deserialize, Serialize };
use std::io;
use std::path::Path;
use std::time::{ Duration, Instant };
use thiserror::Error;

use crate::models::chat::ChatMessage;

/// Fixed key under which the generated client id is persisted in the
/// state directory, created once and reused indefinitely.
pub const USER_ID_FILE: &str = "relay_user_id";

pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";
pub const MALFORMED_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("cooling down for {seconds_left}s")]
    CoolingDown {
        seconds_left: u64,
    },
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        retry_after_seconds: u64,
        detail: String,
    },
    #[error("server rejected the message ({status}): {detail}")]
    Api {
        status: u16,
        detail: String,
    },
    #[error("request timed out")]
    TimedOut,
    #[error("malformed server response")]
    MalformedReply,
    #[error("network error: {0}")]
    Network(String),
}

impl WidgetError {
    /// The friendly line the widget shows in place of an assistant turn.
    pub fn user_message(&self) -> String {
        match self {
            WidgetError::EmptyMessage => "Please type a message first.".to_string(),
            WidgetError::CoolingDown { seconds_left } =>
                format!("Cooling down. Try again in {}s.", seconds_left),
            WidgetError::RateLimited { detail, .. } => detail.clone(),
            WidgetError::Api { detail, .. } => detail.clone(),
            WidgetError::TimedOut => TIMEOUT_MESSAGE.to_string(),
            WidgetError::MalformedReply => MALFORMED_MESSAGE.to_string(),
            WidgetError::Network(_) => NETWORK_MESSAGE.to_string(),
        }
    }
}

#[derive(Serialize)]
struct SendPayload<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ReplyBody {
    reply: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(rename = "retryAfterSeconds", default)]
    retry_after_seconds: Option<u64>,
}

/// Client-side state of the chat widget: the transcript, a cooldown
/// armed by 429 responses, and a request timeout independent of (and
/// shorter than) the server's upstream bound.
pub struct ChatWidget {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    timeout: Duration,
    cooldown_until: Option<Instant>,
    transcript: Vec<ChatMessage>,
}

impl ChatWidget {
    pub fn new(base_url: &str, user_id: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            timeout,
            cooldown_until: None,
            transcript: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.cooldown_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            None
        }
    }

    pub async fn send(&mut self, message: &str) -> Result<String, WidgetError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(WidgetError::EmptyMessage);
        }
        if let Some(remaining) = self.cooldown_remaining() {
            return Err(WidgetError::CoolingDown {
                seconds_left: remaining.as_secs().max(1),
            });
        }

        // Optimistic append, the way the browser widget renders the user
        // bubble before the reply arrives.
        self.transcript.push(ChatMessage::user(message));

        let response = self.http
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(
                &SendPayload {
                    user_id: &self.user_id,
                    message,
                }
            )
            .send().await
            .map_err(|e| {
                if e.is_timeout() {
                    WidgetError::TimedOut
                } else {
                    WidgetError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let detail = body.detail.unwrap_or_else(|| MALFORMED_MESSAGE.to_string());

            if status.as_u16() == 429 {
                let retry_after_seconds = body.retry_after_seconds.unwrap_or(15);
                self.cooldown_until = Some(
                    Instant::now() + Duration::from_secs(retry_after_seconds)
                );
                return Err(WidgetError::RateLimited { retry_after_seconds, detail });
            }

            return Err(WidgetError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let body: ReplyBody = response.json().await.map_err(|_| WidgetError::MalformedReply)?;
        let reply = body.reply.ok_or(WidgetError::MalformedReply)?;
        self.transcript.push(ChatMessage::assistant(&reply));
        Ok(reply)
    }
}

/// Loads the persisted client id from the state directory, generating
/// and saving a fresh one on first use.
pub fn load_or_create_user_id(state_dir: &Path) -> io::Result<String> {
    let path = state_dir.join(USER_ID_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
        Ok(_) | Err(_) => {
            let user_id = uuid::Uuid::new_v4().to_string();
            std::fs::create_dir_all(state_dir)?;
            std::fs::write(&path, &user_id)?;
            Ok(user_id)
        }
    }
}
