use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use tokio::sync::Mutex;

use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Conversation };

/// In-process store. Used as the test double and as a runnable backend
/// for deployments that do not care about restarts.
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_history(
        &self,
        user_id: &str
    ) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>> {
        let conversations = self.conversations.lock().await;
        Ok(
            conversations
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
        let mut conversations = self.conversations.lock().await;
        conversations.entry(user_id.to_string()).or_default().messages.push(message);
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conversations = self.conversations.lock().await;
        if let Some(conversation) = conversations.get_mut(user_id) {
            conversation.messages.clear();
        }
        Ok(())
    }
}
