use chrono::Utc;
use serde::{ Serialize, Deserialize };

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Epoch milliseconds. Non-decreasing within a conversation.
    pub ts: i64,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            ts: Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub created_at: i64,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
