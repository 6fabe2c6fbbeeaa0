use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub title: Option<String>,
}

stored_object!(ChatMessage, "chat_message", {
    session: String,
    owner: String,
    role: Role,
    content: String,
    sources: Vec<SourceRef>,
    position: u32,
});

impl ChatMessage {
    pub fn new(
        session: String,
        owner: String,
        role: Role,
        content: String,
        sources: Vec<SourceRef>,
        position: u32,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            session,
            owner,
            role,
            content,
            sources,
            position,
        }
    }

    pub async fn next_position(db: &SurrealDbClient, session: &str) -> Result<u32, AppError> {
        let mut response = db
            .query("SELECT VALUE position FROM chat_message WHERE session = $session ORDER BY position DESC LIMIT 1")
            .bind(("session", session.to_string()))
            .await?;
        let positions: Vec<u32> = response.take(0)?;
        Ok(positions.first().map_or(0, |p| p + 1))
    }

    pub async fn history(
        db: &SurrealDbClient,
        session: &str,
        last_n: usize,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM chat_message WHERE session = $session ORDER BY position DESC LIMIT $n")
            .bind(("session", session.to_string()))
            .bind(("n", last_n as i64))
            .await?;
        let mut messages: Vec<Self> = response.take(0)?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn list_by_session(db: &SurrealDbClient, session: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM chat_message WHERE session = $session ORDER BY position ASC")
            .bind(("session", session.to_string()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn next_position_increments_from_last() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let first = ChatMessage::next_position(&db, "session-1").await.expect("pos");
        assert_eq!(first, 0);

        let message = ChatMessage::new(
            "session-1".into(),
            "owner-1".into(),
            Role::User,
            "hello".into(),
            vec![],
            first,
        );
        db.store_item(message).await.expect("store");

        let second = ChatMessage::next_position(&db, "session-1").await.expect("pos");
        assert_eq!(second, 1);
    }
}
