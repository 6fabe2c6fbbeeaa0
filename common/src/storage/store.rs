use std::sync::Arc;

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// C2: the content-addressed blob store. Keys are the lowercase hex SHA-256
/// of the bytes, so re-uploading identical content always resolves to the
/// same key — the exact on-disk layout behind `ObjectStore` is explicitly
/// out of scope (§1 Non-goals); only this `put`/`get`/`delete`/`signed_url`
/// contract is.
#[derive(Clone)]
pub struct StorageManager {
    store: Arc<dyn ObjectStore>,
    signing_secret: Arc<str>,
    public_base_url: Arc<str>,
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl StorageManager {
    pub fn in_memory(signing_secret: String, public_base_url: String) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            signing_secret: signing_secret.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn local(
        root: &std::path::Path,
        signing_secret: String,
        public_base_url: String,
    ) -> Result<Self, AppError> {
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| AppError::InternalError(format!("failed to open blob root: {e}")))?;
        Ok(Self {
            store: Arc::new(store),
            signing_secret: signing_secret.into(),
            public_base_url: public_base_url.into(),
        })
    }

    /// Stores `bytes`, keyed by their own content hash, and returns that
    /// key. Idempotent: storing the same bytes twice is a cheap no-op
    /// overwrite, never an error.
    pub async fn put(&self, bytes: Bytes) -> Result<String, AppError> {
        let key = content_hash(&bytes);
        let path = ObjectPath::from(key.as_str());
        self.store.put(&path, bytes.into()).await?;
        Ok(key)
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, AppError> {
        let path = ObjectPath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = ObjectPath::from(key);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// A short-lived signed URL, TTL bounded at the caller's discretion
    /// (the `/documents/{id}/url` endpoint enforces the ≤24h cap from §6).
    /// The signature binds key + expiry so a leaked URL cannot be
    /// re-used past `ttl` or rewritten to another key.
    pub fn signed_url(&self, key: &str, ttl: chrono::Duration) -> String {
        let expires = (chrono::Utc::now() + ttl).timestamp();
        let signature = self.sign(key, expires);
        format!(
            "{}/blobs/{key}?expires={expires}&signature={signature}",
            self.public_base_url
        )
    }

    pub fn verify_signed_url(&self, key: &str, expires: i64, signature: &str) -> bool {
        if chrono::Utc::now().timestamp() > expires {
            return false;
        }
        self.sign(key, expires) == signature
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_content_addressed_and_idempotent() {
        let storage = StorageManager::in_memory("secret".into(), "https://example.test".into());
        let key_a = storage.put(Bytes::from_static(b"hello")).await.expect("put");
        let key_b = storage.put(Bytes::from_static(b"hello")).await.expect("put");
        assert_eq!(key_a, key_b);

        let fetched = storage.get(&key_a).await.expect("get");
        assert_eq!(fetched, Bytes::from_static(b"hello"));
    }

    #[test]
    fn signed_url_rejects_expired_and_tampered_signatures() {
        let storage = StorageManager::in_memory("secret".into(), "https://example.test".into());
        let url = storage.signed_url("abc123", chrono::Duration::seconds(60));
        assert!(url.contains("expires="));

        let expires = chrono::Utc::now().timestamp() + 60;
        let signature = storage.sign("abc123", expires);
        assert!(storage.verify_signed_url("abc123", expires, &signature));
        assert!(!storage.verify_signed_url("abc123", expires, "tampered"));
        assert!(!storage.verify_signed_url(
            "abc123",
            chrono::Utc::now().timestamp() - 1,
            &signature
        ));
    }
}
