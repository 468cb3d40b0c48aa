//! Broker connection: where a queue lives and how to authenticate against it.

use std::sync::Arc;

use crate::auth::{
    ConnectionIdentity, CredentialCache, CredentialProvider, InMemoryCredentialCache,
    SasTokenGenerator, SharedAccessKey,
};
use crate::error::{ConfigurationError, QueueError};
use crate::message::QueueName;

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;

/// Resolved endpoint and credentials for one Service Bus queue.
///
/// The base URI is frozen at construction and always ends with `/`, so
/// operation paths (`messages`, `messages/head`) are appended directly.
/// Connections are long-lived and shared between the queue and every job it
/// hands out.
#[derive(Debug)]
pub struct ServiceBusConnection {
    identity: ConnectionIdentity,
    endpoint_base_uri: String,
    credentials: CredentialProvider,
}

impl ServiceBusConnection {
    /// Connect to `https://{namespace}.servicebus.windows.net/{queue}/`
    ///
    /// # Errors
    ///
    /// Returns a configuration or validation error if any part is empty or the
    /// queue name is not a valid entity path.
    pub fn new(
        namespace: impl Into<String>,
        queue: &str,
        key_name: impl Into<String>,
        key: SharedAccessKey,
    ) -> Result<Self, QueueError> {
        let namespace = namespace.into();
        Self::validate_namespace(&namespace)?;
        let endpoint = format!("https://{}.servicebus.windows.net/{}/", namespace, queue);

        Self::with_endpoint(namespace, queue, &endpoint, key_name, key)
    }

    /// Connect through an explicit base URI (emulators, private endpoints, tests)
    ///
    /// A trailing `/` is appended when missing.
    pub fn with_endpoint(
        namespace: impl Into<String>,
        queue: &str,
        endpoint: &str,
        key_name: impl Into<String>,
        key: SharedAccessKey,
    ) -> Result<Self, QueueError> {
        let namespace = namespace.into();
        let key_name = key_name.into();
        Self::validate_namespace(&namespace)?;

        let queue = QueueName::new(queue.to_string())?;

        if key_name.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "key_name".to_string(),
            }
            .into());
        }
        if key.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "key".to_string(),
            }
            .into());
        }

        url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("Invalid endpoint '{}': {}", endpoint, e),
        })?;

        let endpoint_base_uri = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };

        let credentials = CredentialProvider::new(
            SasTokenGenerator::new(key_name, key),
            Arc::new(InMemoryCredentialCache::new()),
        );

        Ok(Self {
            identity: ConnectionIdentity::new(namespace, queue),
            endpoint_base_uri,
            credentials,
        })
    }

    /// Use a shared credential cache instead of the connection's private one
    pub fn with_cache(mut self, cache: Arc<dyn CredentialCache>) -> Self {
        self.credentials = self.credentials.with_cache(cache);
        self
    }

    fn validate_namespace(namespace: &str) -> Result<(), QueueError> {
        if namespace.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "namespace".to_string(),
            }
            .into());
        }

        if !namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "Namespace '{}' may only contain letters, digits and hyphens",
                    namespace
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Service Bus namespace
    pub fn namespace(&self) -> &str {
        self.identity.namespace()
    }

    /// Queue this connection targets
    pub fn queue(&self) -> &QueueName {
        self.identity.queue()
    }

    /// Identity used to key cached credentials
    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Base URI of the queue, ending with `/`
    pub fn endpoint_base_uri(&self) -> &str {
        &self.endpoint_base_uri
    }

    /// Name of the shared access policy
    pub fn key_name(&self) -> &str {
        self.credentials.key_name()
    }

    /// URL messages are sent to
    pub fn messages_url(&self) -> String {
        format!("{}messages", self.endpoint_base_uri)
    }

    /// URL of the head of the queue (peek-lock receive and destructive delete)
    pub fn head_url(&self) -> String {
        format!("{}messages/head", self.endpoint_base_uri)
    }

    /// Value for the `Authorization` header, signing a new token if the cached one expired
    pub async fn authorization_header(&self) -> Result<String, QueueError> {
        self.credentials
            .get_token(&self.identity, &self.endpoint_base_uri)
            .await
    }
}
