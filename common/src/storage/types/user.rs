use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;

stored_object!(User, "user", {
    email: String,
    password_hash: String,
});

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            email,
            password_hash,
        }
    }

    pub async fn find_by_email(db: &SurrealDbClient, email: &str) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM user WHERE email = $email LIMIT 1")
            .bind(("email", email.to_string()))
            .await?;
        let found: Vec<Self> = response.take(0)?;
        Ok(found.into_iter().next())
    }

    /// Creates a user with an argon2-hashed password, delegating the hash
    /// itself to SurrealDB's `crypto::argon2::generate` rather than a Rust
    /// KDF crate (§6 `/auth/register`).
    pub async fn register(db: &SurrealDbClient, email: String, password: String) -> Result<Self, AppError> {
        if Self::find_by_email(db, &email).await?.is_some() {
            return Err(AppError::Validation("email already registered".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let mut response = db
            .query(
                "CREATE type::thing('user', $id) SET \
                 email = $email, password_hash = crypto::argon2::generate($password), \
                 created_at = $created_at, updated_at = $updated_at",
            )
            .bind(("id", id))
            .bind(("email", email))
            .bind(("password", password))
            .bind(("created_at", surrealdb::sql::Datetime::from(now)))
            .bind(("updated_at", surrealdb::sql::Datetime::from(now)))
            .await?;
        let created: Vec<Self> = response.take(0)?;
        created.into_iter().next().ok_or_else(|| AppError::InternalError("user failed to create".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_has_fresh_id() {
        let a = User::new("a@example.com".into(), "hash".into());
        let b = User::new("b@example.com".into(), "hash".into());
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn register_rejects_a_duplicate_email() {
        let db = SurrealDbClient::memory("test", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let first = User::register(&db, "a@example.com".to_string(), "hunter2-hunter2".to_string())
            .await
            .expect("register");
        assert_eq!(first.email, "a@example.com");
        assert_ne!(first.password_hash, "hunter2-hunter2");

        let result = User::register(&db, "a@example.com".to_string(), "other-password".to_string()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
