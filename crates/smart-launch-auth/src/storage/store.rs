//! Consume-once key-value store abstraction.
//!
//! Every single-use artifact (authorization codes, launch tokens, rotating
//! refresh tokens) is redeemed through [`TokenStore::atomic_consume`]. The
//! read and the invalidation happen in one store operation, so two
//! concurrent redemptions of the same key can never both succeed.
//!
//! # Implementation Notes
//!
//! A networked implementation maps the operations onto native primitives:
//!
//! | Operation        | Redis               | PostgreSQL                          |
//! |------------------|---------------------|-------------------------------------|
//! | `put`            | `SET key v PX ttl`  | `INSERT ... expires_at`             |
//! | `atomic_consume` | `GETDEL key`        | `DELETE ... RETURNING value`        |
//! | `get`            | `GET key`           | `SELECT ... WHERE expires_at > now` |
//! | `ttl`            | `PTTL key`          | `SELECT expires_at - now()`         |

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors raised by a [`TokenStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Key-value store with per-key TTL and atomic consume-once reads.
///
/// Expired entries must behave exactly like missing ones for every
/// operation, whether or not they have been physically removed yet.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// The entry expires `ttl` after this call.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically returns and removes the value under `key`.
    ///
    /// Returns `None` if the key is missing, expired, or was already
    /// consumed. At most one caller ever receives `Some` for a given `put`.
    async fn atomic_consume(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns the remaining lifetime of `key`, or `None` if it is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Returns the value under `key` without consuming it.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removes expired entries and returns how many were removed.
    ///
    /// Stores with native expiry need not override this.
    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Typed JSON view over the keys of a [`TokenStore`] sharing one prefix.
pub struct NamespacedStore<T> {
    store: Arc<dyn TokenStore>,
    prefix: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for NamespacedStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix,
            _marker: PhantomData,
        }
    }
}

impl<T> NamespacedStore<T>
where
    T: Serialize + DeserializeOwned + Sync,
{
    /// Creates a view over keys starting with `prefix`.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, prefix: &'static str) -> Self {
        Self {
            store,
            prefix,
            _marker: PhantomData,
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Serializes and stores `value` under `id`.
    pub async fn put(&self, id: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(&self.key(id), bytes, ttl).await
    }

    /// Atomically takes the value under `id`.
    pub async fn consume(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.atomic_consume(&self.key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads the value under `id` without consuming it.
    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(&self.key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns `true` if a live value exists under `id`.
    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.store.ttl(&self.key(id)).await?.is_some())
    }

    /// Returns the remaining lifetime of `id`.
    pub async fn ttl(&self, id: &str) -> Result<Option<Duration>, StoreError> {
        self.store.ttl(&self.key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTokenStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        value: String,
    }

    fn store() -> (Arc<dyn TokenStore>, NamespacedStore<Record>) {
        let raw: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let typed = NamespacedStore::new(Arc::clone(&raw), "test");
        (raw, typed)
    }

    #[tokio::test]
    async fn test_namespaced_put_and_consume() {
        let (raw, typed) = store();
        let record = Record {
            value: "a".to_string(),
        };

        typed
            .put("id1", &record, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(raw.get("test:id1").await.unwrap().is_some());

        assert_eq!(typed.consume("id1").await.unwrap(), Some(record));
        assert_eq!(typed.consume("id1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let raw: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let a: NamespacedStore<Record> = NamespacedStore::new(Arc::clone(&raw), "a");
        let b: NamespacedStore<Record> = NamespacedStore::new(Arc::clone(&raw), "b");

        a.put(
            "same",
            &Record {
                value: "a".to_string(),
            },
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert!(b.get("same").await.unwrap().is_none());
        assert!(a.exists("same").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_serialization_error() {
        let (raw, typed) = store();
        raw.put("test:bad", b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let err = typed.consume("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
