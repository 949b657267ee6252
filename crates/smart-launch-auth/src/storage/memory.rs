//! In-process [`TokenStore`] backed by a sharded concurrent map.
//!
//! # Deployment
//!
//! State lives in this process only. Running more than one server instance
//! against separate `MemoryTokenStore`s lets a code issued by one instance be
//! unknown to the others and breaks single-use guarantees across instances.
//! Use it for single-instance deployments and tests; clustered deployments
//! need a shared store with atomic get-and-delete.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{StoreError, TokenStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-instance token store.
///
/// `atomic_consume` is a single `DashMap::remove`, which takes the shard
/// write lock, so exactly one concurrent caller observes the value.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, Entry>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Unavailable(format!("TTL out of range: {ttl:?}")))?;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn atomic_consume(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired store entries");
        }
        Ok(removed)
    }
}
