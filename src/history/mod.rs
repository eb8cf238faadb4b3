mod json;
mod memory;
mod sqlite;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::models::chat::ChatMessage;

/// Per-user conversation history. Appends are durable before the call
/// returns; unknown users read as empty, never as an error.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_history(
        &self,
        user_id: &str
    ) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>>;

    async fn append(
        &self,
        user_id: &str,
        message: ChatMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Empties the message list but keeps the conversation record.
    /// Idempotent for unknown users.
    async fn clear(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub async fn create_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "json" => {
            let store = JsonFileStore::new(&args.history_path)?;
            Ok(Arc::new(store))
        }
        "sqlite" => {
            let store = SqliteStore::new(Some(&args.history_path)).await?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub async fn initialize_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    info!("Conversation history will be stored in: {} at {}", args.history_type, args.history_path);
    create_store(args).await
}
