//! In-memory credential cache with TTL support.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::CredentialCache;
use crate::error::CacheError;

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

/// Process-local credential cache.
///
/// Cloning shares the underlying storage, so one instance can back every
/// connection in a registry.
#[derive(Clone, Default)]
pub struct InMemoryCredentialCache {
    entries: Arc<RwLock<HashMap<String, CachedCredential>>>,
}

/// Cached value with its expiry.
struct CachedCredential {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedCredential {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl InMemoryCredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet cleaned up
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Check whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialCache for InMemoryCredentialCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire read lock: {}", e),
            })?;

        let now = Utc::now();
        Ok(entries
            .get(key)
            .filter(|cached| cached.is_valid_at(now))
            .map(|cached| cached.value.clone()))
    }

    async fn store(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?;

        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        entries.insert(key.to_string(), CachedCredential { value, expires_at });

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?;

        entries.remove(key);

        Ok(())
    }

    fn cleanup_expired(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Utc::now();
            entries.retain(|_, cached| cached.is_valid_at(now));
        }
    }
}
