#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

use async_trait::async_trait;
use chrono::Utc;
use std::error::Error;
use tokio_rusqlite::{ Connection, params };

use crate::history::ConversationStore;
use crate::models::chat::ChatMessage;

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    user_id    TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES conversations(user_id),
    role    TEXT NOT NULL,
    content TEXT NOT NULL,
    ts      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id);
";

/// Relational backend. One row per message, ordered by insertion id;
/// clearing history deletes the messages but keeps the conversation row.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn new(path: Option<&str>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conn = match path {
            Some(path) =>
                Connection::open(path).await.map_err(|e|
                    format!("Failed to open history database '{}': {}", path, e)
                )?,
            None => Connection::open_in_memory().await?,
        };

        conn.call(|conn| Ok::<_, tokio_rusqlite::rusqlite::Error>(conn.execute_batch(MIGRATION)?)).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_history(
        &self,
        user_id: &str
    ) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>> {
        let user_id = user_id.to_string();
        let messages = self.conn.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, ts FROM messages WHERE user_id = ? ORDER BY id"
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(ChatMessage {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    ts: row.get(2)?,
                });
            }
            Ok::<_, tokio_rusqlite::rusqlite::Error>(messages)
        }).await?;

        Ok(messages)
    }

    async fn append(
        &self,
        user_id: &str,
        message: ChatMessage
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO conversations (user_id, created_at) VALUES (?, ?)",
                params![user_id, now]
            )?;
            tx.execute(
                "INSERT INTO messages (user_id, role, content, ts) VALUES (?, ?, ?, ?)",
                params![user_id, message.role, message.content, message.ts]
            )?;
            tx.commit()?;
            Ok::<_, tokio_rusqlite::rusqlite::Error>(())
        }).await?;

        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let user_id = user_id.to_string();
        self.conn.call(move |conn| {
            conn.execute("DELETE FROM messages WHERE user_id = ?", params![user_id])?;
            Ok::<_, tokio_rusqlite::rusqlite::Error>(())
        }).await?;

        Ok(())
    }
}
