use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


stored_object!(ChatSession, "chat_session", {
    owner: String,
    collection: Option<String>,
    title: Option<String>,
});

impl ChatSession {
    pub fn new(owner: String, collection: Option<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            collection,
            title: None,
        }
    }

    /// Resolves the session to use for a chat turn per §4.4: a supplied id
    /// is honored only if it exists and is owned by the caller. Otherwise a
    /// fresh, server-generated session is created. This is the only path
    /// that may return a session — callers never construct one directly.
    pub async fn resolve_or_create(
        db: &SurrealDbClient,
        owner: &str,
        requested_id: Option<&str>,
        collection: Option<String>,
    ) -> Result<Self, AppError> {
        if let Some(id) = requested_id {
            if let Some(existing) = db.get_item::<Self>(id).await? {
                if existing.owner == owner {
                    return Ok(existing);
                }
            }
        }
        let session = Self::new(owner.to_string(), collection);
        db.store_item(session.clone()).await?;
        Ok(session)
    }

    pub async fn set_title(db: &SurrealDbClient, id: &str, title: &str) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('chat_session', $id) SET title = $title, updated_at = time::now()",
        )
        .bind(("id", id.to_string()))
        .bind(("title", title.to_string()))
        .await?;
        Ok(())
    }

    pub async fn list_by_owner(db: &SurrealDbClient, owner: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM chat_session WHERE owner = $owner ORDER BY updated_at DESC")
            .bind(("owner", owner.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn delete_with_messages(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "BEGIN TRANSACTION;
             DELETE chat_message WHERE session = $id;
             DELETE type::thing('chat_session', $id);
             COMMIT TRANSACTION;",
        )
        .bind(("id", id.to_string()))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn cross_owner_session_id_is_ignored() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let s1 = ChatSession::resolve_or_create(&db, "u1", None, None)
            .await
            .expect("create");

        let s2 = ChatSession::resolve_or_create(&db, "u2", Some(&s1.id), None)
            .await
            .expect("resolve");
        assert_ne!(s1.id, s2.id);
        assert_eq!(s2.owner, "u2");
    }
}
