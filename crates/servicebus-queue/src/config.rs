//! Connection configuration.
//!
//! Configuration is plain serde data so hosts can load it from any source.
//! A typical YAML layout:
//!
//! ```yaml
//! default: servicebus
//! connections:
//!   servicebus:
//!     driver: azure-service-bus
//!     namespace: contoso
//!     queue: jobs
//!     key_name: RootManageSharedAccessKey
//!     key: "<secret>"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ConfigurationError, QueueError};
use crate::message::QueueName;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Driver name under which the Service Bus connector is registered
pub const DEFAULT_DRIVER: &str = "azure-service-bus";

/// Connection used when none is named
pub const DEFAULT_CONNECTION: &str = "servicebus";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

/// Settings for one Service Bus queue connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBusQueueConfig {
    /// Registered driver that builds the queue
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Service Bus namespace (the `{namespace}.servicebus.windows.net` label)
    pub namespace: String,

    /// Queue (entity) name
    pub queue: String,

    /// Shared access policy name
    pub key_name: String,

    /// Shared access policy key
    #[serde(skip_serializing)]
    pub key: String,

    /// Explicit base URI, replacing the one derived from `namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl ServiceBusQueueConfig {
    /// Create config for the default driver
    pub fn new(
        namespace: impl Into<String>,
        queue: impl Into<String>,
        key_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            driver: default_driver(),
            namespace: namespace.into(),
            queue: queue.into(),
            key_name: key_name.into(),
            key: key.into(),
            endpoint: None,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }

    /// Check that every required field is present and well formed
    pub fn validate(&self) -> Result<(), QueueError> {
        let required = [
            ("driver", &self.driver),
            ("namespace", &self.namespace),
            ("queue", &self.queue),
            ("key_name", &self.key_name),
            ("key", &self.key),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigurationError::Missing {
                    key: key.to_string(),
                }
                .into());
            }
        }

        QueueName::new(self.queue.clone())?;

        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "request_timeout_seconds must be greater than zero".to_string(),
            }
            .into());
        }

        if let Some(ref endpoint) = self.endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
                message: format!("Invalid endpoint '{}': {}", endpoint, e),
            })?;
        }

        Ok(())
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }
}

impl fmt::Debug for ServiceBusQueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusQueueConfig")
            .field("driver", &self.driver)
            .field("namespace", &self.namespace)
            .field("queue", &self.queue)
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Named queue connections plus the default one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConnectionsConfig {
    #[serde(default = "default_connection")]
    pub default: String,

    #[serde(default)]
    pub connections: HashMap<String, ServiceBusQueueConfig>,
}

impl Default for QueueConnectionsConfig {
    fn default() -> Self {
        Self {
            default: default_connection(),
            connections: HashMap::new(),
        }
    }
}

impl QueueConnectionsConfig {
    /// Add or replace a named connection
    pub fn with_connection(
        mut self,
        name: impl Into<String>,
        config: ServiceBusQueueConfig,
    ) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Resolve `name`, or the default connection when `None`
    pub fn get(&self, name: Option<&str>) -> Result<(&str, &ServiceBusQueueConfig), QueueError> {
        let name = name.unwrap_or(&self.default);
        self.connections
            .get_key_value(name)
            .map(|(name, config)| (name.as_str(), config))
            .ok_or_else(|| {
                ConfigurationError::UnknownConnection {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Validate the default reference and every connection
    pub fn validate(&self) -> Result<(), QueueError> {
        if !self.connections.contains_key(&self.default) {
            return Err(ConfigurationError::UnknownConnection {
                name: self.default.clone(),
            }
            .into());
        }

        for (name, config) in &self.connections {
            config.validate().map_err(|e| ConfigurationError::Invalid {
                message: format!("connection '{}': {}", name, e),
            })?;
        }

        Ok(())
    }
}
