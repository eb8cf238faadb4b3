#[cfg(test)]
#[path = "json_test.rs"]
mod tests;

use async_trait::async_trait;
use serde::{ Serialize, Deserialize };
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Serialize, Deserialize, Default)]
struct Document {
    conversations: HashMap<String, Conversation>,
}

/// Single-document JSON store. Every append rewrites the whole file and
/// flushes before returning. Acceptable only at small scale; the write
/// amplification is a known limitation of this backend, not a feature.
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl JsonFileStore {
    pub fn new(path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = PathBuf::from(path);
        let document = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Document::default(),
            Ok(raw) =>
                serde_json
                    ::from_str(&raw)
                    .map_err(|e|
                        format!("Failed to parse history file '{}': {}", path.display(), e)
                    )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => {
                return Err(format!("Failed to read history file '{}': {}", path.display(), e).into());
            }
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    async fn flush(&self, document: &Document) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn get_history(
        &self,
        user_id: &str
    ) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>> {
        let document = self.document.lock().await;
        Ok(
            document.conversations
                .get(user_id)
                .map(|c| c.messages.clone())
                .unwrap_or_default()
        )
    }

    async fn append(
        &self,
        user_id: &str,
        message: ChatMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut document = self.document.lock().await;
        document.conversations.entry(user_id.to_string()).or_default().messages.push(message);
        self.flush(&document).await
    }

    async fn clear(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut document = self.document.lock().await;
        match document.conversations.get_mut(user_id) {
            Some(conversation) => {
                conversation.messages.clear();
                self.flush(&document).await
            }
            None => Ok(()),
        }
    }
}
