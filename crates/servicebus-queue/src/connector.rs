//! Connectors and the named-connection registry.
//!
//! A connector turns a [`ServiceBusQueueConfig`] into a ready queue. The
//! [`QueueRegistry`] maps driver names to connectors and connection names to
//! queues, building each queue on first use and handing out the same instance
//! afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::auth::{CredentialCache, InMemoryCredentialCache, SharedAccessKey};
use crate::config::{QueueConnectionsConfig, ServiceBusQueueConfig, DEFAULT_DRIVER};
use crate::connection::ServiceBusConnection;
use crate::error::{CacheError, ConfigurationError, QueueError};
use crate::queue::{JobQueue, ServiceBusQueue};
use crate::transport::{HttpTransport, ReqwestTransport};

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;

/// Builds a queue from connection settings
pub trait QueueConnector: Send + Sync {
    /// Build the queue for connection `name`
    fn connect(
        &self,
        config: &ServiceBusQueueConfig,
        name: &str,
    ) -> Result<Arc<dyn JobQueue>, QueueError>;
}

// ============================================================================
// ServiceBusConnector
// ============================================================================

/// Connector for Service Bus queues over REST
///
/// Every queue built by one connector shares its credential cache.
#[derive(Clone)]
pub struct ServiceBusConnector {
    cache: Arc<dyn CredentialCache>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ServiceBusConnector {
    /// Create connector with a fresh in-memory credential cache
    pub fn new() -> Self {
        Self {
            cache: Arc::new(InMemoryCredentialCache::new()),
            transport: None,
        }
    }

    /// Share an existing credential cache
    pub fn with_cache(mut self, cache: Arc<dyn CredentialCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Send every request through `transport` instead of building a reqwest client per queue
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build a [`ServiceBusQueue`] for connection `name`
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` or `QueueError::Validation` if the
    /// settings are incomplete, and `QueueError::Transport` if the HTTP client
    /// cannot be created.
    pub fn connect_queue(
        &self,
        config: &ServiceBusQueueConfig,
        name: &str,
    ) -> Result<ServiceBusQueue, QueueError> {
        config.validate()?;

        let key = SharedAccessKey::new(config.key.clone());
        let connection = match config.endpoint {
            Some(ref endpoint) => ServiceBusConnection::with_endpoint(
                config.namespace.clone(),
                &config.queue,
                endpoint,
                config.key_name.clone(),
                key,
            )?,
            None => ServiceBusConnection::new(
                config.namespace.clone(),
                &config.queue,
                config.key_name.clone(),
                key,
            )?,
        }
        .with_cache(Arc::clone(&self.cache));

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(ref transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::new(config.request_timeout())?),
        };

        debug!(
            connection = name,
            endpoint = connection.endpoint_base_uri(),
            "Connected Service Bus queue"
        );

        Ok(ServiceBusQueue::new(Arc::new(connection), transport).with_connection_name(name))
    }
}

impl Default for ServiceBusConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueConnector for ServiceBusConnector {
    fn connect(
        &self,
        config: &ServiceBusQueueConfig,
        name: &str,
    ) -> Result<Arc<dyn JobQueue>, QueueError> {
        Ok(Arc::new(self.connect_queue(config, name)?))
    }
}

// ============================================================================
// QueueRegistry
// ============================================================================

/// Resolves named connections to queues through registered drivers
pub struct QueueRegistry {
    config: QueueConnectionsConfig,
    drivers: HashMap<String, Arc<dyn QueueConnector>>,
    queues: RwLock<HashMap<String, Arc<dyn JobQueue>>>,
}

impl QueueRegistry {
    /// Create registry with the Service Bus driver registered
    pub fn new(config: QueueConnectionsConfig) -> Self {
        let mut registry = Self {
            config,
            drivers: HashMap::new(),
            queues: RwLock::new(HashMap::new()),
        };
        registry.register_driver(DEFAULT_DRIVER, Arc::new(ServiceBusConnector::new()));
        registry
    }

    /// Register or replace the connector for `driver`
    pub fn register_driver(
        &mut self,
        driver: impl Into<String>,
        connector: Arc<dyn QueueConnector>,
    ) {
        self.drivers.insert(driver.into(), connector);
    }

    /// Whether a connector is registered for `driver`
    pub fn has_driver(&self, driver: &str) -> bool {
        self.drivers.contains_key(driver)
    }

    /// Name of the default connection
    pub fn default_connection(&self) -> &str {
        &self.config.default
    }

    /// Queue for connection `name`, or the default connection when `None`
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` if the connection is unknown, its
    /// driver is not registered, or its settings are invalid.
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<dyn JobQueue>, QueueError> {
        let (name, config) = self.config.get(name)?;

        if let Some(queue) = self.read_queues()?.get(name) {
            return Ok(Arc::clone(queue));
        }

        let connector =
            self.drivers
                .get(&config.driver)
                .ok_or_else(|| ConfigurationError::UnsupportedDriver {
                    driver: config.driver.clone(),
                })?;

        let queue = connector.connect(config, name)?;

        let mut queues = self.queues.write().map_err(|e| CacheError::OperationFailed {
            message: format!("Queue registry lock poisoned: {}", e),
        })?;
        let queue = Arc::clone(queues.entry(name.to_string()).or_insert(queue));

        info!(connection = name, driver = %config.driver, "Resolved queue connection");
        Ok(queue)
    }

    fn read_queues(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn JobQueue>>>, QueueError> {
        self.queues.read().map_err(|e| {
            CacheError::OperationFailed {
                message: format!("Queue registry lock poisoned: {}", e),
            }
            .into()
        })
    }
}
