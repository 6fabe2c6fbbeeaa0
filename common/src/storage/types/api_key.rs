use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


const RAW_KEY_BYTES: usize = 32;
const PREFIX_CHARS: usize = 8;
const SALT_BYTES: usize = 16;

stored_object!(ApiKey, "api_key", {
    owner: String,
    key_hash: String,
    key_prefix: String,
    scopes: Vec<String>,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
});

/// The raw bearer value, returned to the caller exactly once at issuance.
/// Nothing in this struct is ever stored: only `ApiKey` (the hash + prefix)
/// is persisted, satisfying §8 invariant 2.
pub struct IssuedApiKey {
    pub record: ApiKey,
    pub raw_key: String,
}

fn hash_with_salt(raw_key: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

impl ApiKey {
    pub fn issue(owner: String, scopes: Vec<String>) -> IssuedApiKey {
        let mut rng = rand::thread_rng();
        let mut raw = vec![0u8; RAW_KEY_BYTES];
        rng.fill_bytes(&mut raw);
        let raw_key = format!("mnem_{}", hex::encode(raw));

        let mut salt = [0u8; SALT_BYTES];
        rng.fill_bytes(&mut salt);
        let key_hash = format!("{}:{}", hex::encode(salt), hash_with_salt(&raw_key, &salt));
        let key_prefix = raw_key.chars().take(PREFIX_CHARS).collect();

        let now = chrono::Utc::now();
        let record = ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            key_hash,
            key_prefix,
            scopes,
            last_used_at: None,
        };
        IssuedApiKey { record, raw_key }
    }

    fn matches(&self, raw_key: &str) -> bool {
        let Some((salt_hex, expected_hash)) = self.key_hash.split_once(':') else {
            return false;
        };
        let Ok(salt) = hex::decode(salt_hex) else {
            return false;
        };
        hash_with_salt(raw_key, &salt) == expected_hash
    }

    /// Looks up by prefix (indexed, cheap) then verifies the full hash in
    /// application code, so the store never needs to compare raw keys.
    pub async fn authenticate(db: &SurrealDbClient, raw_key: &str) -> Result<Option<Self>, AppError> {
        if raw_key.chars().count() < PREFIX_CHARS {
            return Ok(None);
        }
        let prefix: String = raw_key.chars().take(PREFIX_CHARS).collect();
        let mut response = db
            .query("SELECT * FROM api_key WHERE key_prefix = $prefix")
            .bind(("prefix", prefix))
            .await?;
        let candidates: Vec<Self> = response.take(0)?;
        let found = candidates.into_iter().find(|key| key.matches(raw_key));
        if let Some(ref key) = found {
            db.query("UPDATE type::thing('api_key', $id) SET last_used_at = time::now()")
                .bind(("id", key.id.clone()))
                .await?;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn raw_key_is_never_recoverable_from_the_hash() {
        let issued = ApiKey::issue("owner-1".to_string(), vec!["read".to_string()]);
        assert!(!issued.record.key_hash.contains(&issued.raw_key));
        assert!(issued.record.matches(&issued.raw_key));
        assert!(!issued.record.matches("wrong-key"));
    }

    #[tokio::test]
    async fn authenticate_finds_the_matching_key_by_prefix() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let issued = ApiKey::issue("owner-1".to_string(), vec!["read".to_string()]);
        db.store_item(issued.record.clone()).await.expect("store");

        let found = ApiKey::authenticate(&db, &issued.raw_key)
            .await
            .expect("auth");
        assert_eq!(found.map(|k| k.id), Some(issued.record.id));

        let not_found = ApiKey::authenticate(&db, "mnem_totallywrongvalue")
            .await
            .expect("auth");
        assert!(not_found.is_none());
    }
}
