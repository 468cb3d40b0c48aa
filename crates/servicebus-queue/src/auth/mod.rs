//! Shared access signature (SAS) authentication for Service Bus REST calls.
//!
//! Every request carries an `Authorization` header holding a signed,
//! time-bounded token for the queue's resource URI. Signing is cheap but not
//! free, so tokens are memoized per queue in a [`CredentialCache`] for slightly
//! less than their validity window:
//!
//! - tokens are valid for [`TOKEN_VALIDITY_SECONDS`] (7 days)
//! - cache entries live [`CACHE_SAFETY_MARGIN_SECONDS`] less than that, so a
//!   served token always has at least an hour of validity left
//! - entries are keyed by queue, resource URI and policy name, so connections
//!   sharing a cache never see each other's tokens
//!
//! The cache is the only state shared between queue instances. Concurrent
//! callers for the same queue may both sign and store; the last write wins and
//! either token is valid. A failing cache never fails a request: lookups
//! degrade to a miss and the freshly signed token is returned regardless.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CacheError, QueueError};
use crate::message::QueueName;

mod cache;
mod sas;

pub use cache::InMemoryCredentialCache;
pub use sas::SasTokenGenerator;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// Validity window of a freshly signed token.
pub const TOKEN_VALIDITY_SECONDS: i64 = 60 * 60 * 24 * 7;

/// How much earlier than the token itself a cache entry expires.
pub const CACHE_SAFETY_MARGIN_SECONDS: i64 = 3600;

/// Time-to-live of a cached token.
pub fn cache_ttl() -> Duration {
    Duration::seconds(TOKEN_VALIDITY_SECONDS - CACHE_SAFETY_MARGIN_SECONDS)
}

// ============================================================================
// Credential Types
// ============================================================================

/// Shared access key secret.
///
/// The value is never included in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedAccessKey(String);

impl SharedAccessKey {
    /// Wrap a key secret
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key bytes used as the HMAC key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check whether the secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedAccessKey(<redacted>)")
    }
}

/// Identity of one queue for credential caching purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    namespace: String,
    queue: QueueName,
}

impl ConnectionIdentity {
    /// Create identity for a queue in a namespace
    pub fn new(namespace: impl Into<String>, queue: QueueName) -> Self {
        Self {
            namespace: namespace.into(),
            queue,
        }
    }

    /// Service Bus namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Queue name
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.queue)
    }
}

// ============================================================================
// Credential Cache
// ============================================================================

/// Keyed store with per-entry TTL used to memoize signed tokens.
///
/// Implementations must never return an entry at or after its expiry and must
/// tolerate concurrent stores for the same key.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Get a live entry
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store an entry that expires after `ttl`
    async fn store(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove an entry
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Drop all expired entries
    fn cleanup_expired(&self);
}

// ============================================================================
// Credential Provider
// ============================================================================

/// Produces authorization header values, signing only when the cache is cold.
#[derive(Clone)]
pub struct CredentialProvider {
    generator: SasTokenGenerator,
    cache: Arc<dyn CredentialCache>,
}

impl CredentialProvider {
    /// Create provider signing with `generator` and memoizing into `cache`
    pub fn new(generator: SasTokenGenerator, cache: Arc<dyn CredentialCache>) -> Self {
        Self { generator, cache }
    }

    /// Same signer backed by a different cache
    pub fn with_cache(self, cache: Arc<dyn CredentialCache>) -> Self {
        Self {
            generator: self.generator,
            cache,
        }
    }

    /// Name of the shared access policy used for signing
    pub fn key_name(&self) -> &str {
        self.generator.key_name()
    }

    /// Cache key for tokens this provider signs for `resource_uri`
    pub fn cache_key(&self, identity: &ConnectionIdentity, resource_uri: &str) -> String {
        format!(
            "servicebus:sas-token:{}|{}|{}",
            identity,
            resource_uri.to_lowercase(),
            self.key_name()
        )
    }

    /// Get a signed token for `resource_uri`, reusing the cached one if still live.
    ///
    /// Cache failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AuthSigningFailure` if the signature cannot be computed.
    pub async fn get_token(
        &self,
        identity: &ConnectionIdentity,
        resource_uri: &str,
    ) -> Result<String, QueueError> {
        let key = self.cache_key(identity, resource_uri);

        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(queue = %identity, error = %e, "Credential cache lookup failed");
                None
            }
        };
        if let Some(token) = cached {
            return Ok(token);
        }

        let expires_at = Utc::now().timestamp() + TOKEN_VALIDITY_SECONDS;
        let token = self.generator.generate(resource_uri, expires_at)?;

        if let Err(e) = self.cache.store(&key, token.clone(), cache_ttl()).await {
            warn!(queue = %identity, error = %e, "Failed to cache signed token");
        }

        debug!(
            queue = %identity,
            expires_at = expires_at,
            "Signed new shared access token"
        );

        Ok(token)
    }

    /// Drop the cached token for `resource_uri`, forcing the next call to re-sign
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Cache` if the entry could not be removed.
    pub async fn invalidate(
        &self,
        identity: &ConnectionIdentity,
        resource_uri: &str,
    ) -> Result<(), QueueError> {
        self.cache
            .invalidate(&self.cache_key(identity, resource_uri))
            .await?;
        Ok(())
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("generator", &self.generator)
            .field("cache", &"<shared>")
            .finish()
    }
}
