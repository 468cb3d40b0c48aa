//! # Service Bus Queue
//!
//! Job queue adapter for Azure Service Bus queues reached through the HTTP
//! REST surface only.
//!
//! This library provides:
//! - Shared access signature (SAS) tokens, signed on demand and cached per queue
//! - Push and scheduled push of JSON job payloads
//! - Peek-lock receive with explicit delete or unlock of each message
//! - Queue size from the queue description and best-effort clearing
//! - Named connections resolved through registered drivers
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, lock locations, broker properties and delays
//! - [`auth`] - Token signing and the credential cache
//! - [`connection`] - Endpoint and credentials for one queue
//! - [`transport`] - HTTP seam and the reqwest implementation
//! - [`payload`] - Job descriptors and payload envelopes
//! - [`queue`] - The [`JobQueue`] capability and [`ServiceBusQueue`]
//! - [`job`] - The [`LeasedJob`] capability and [`ServiceBusJob`]
//! - [`config`] / [`connector`] - Connection settings and the registry
//!
//! ## Example
//!
//! ```no_run
//! use servicebus_queue::{JobDescriptor, LeasedJob, ServiceBusConnector, ServiceBusQueueConfig};
//!
//! # async fn run() -> Result<(), servicebus_queue::QueueError> {
//! let config =
//!     ServiceBusQueueConfig::new("contoso", "jobs", "RootManageSharedAccessKey", "<key>");
//! let queue = ServiceBusConnector::new().connect_queue(&config, "servicebus")?;
//!
//! queue
//!     .push(&JobDescriptor::new("SendWelcomeEmail", serde_json::json!({"user": 7})), None)
//!     .await?;
//!
//! if let Some(job) = queue.pop(None).await? {
//!     println!("{} attempt {}", job.job_id(), job.attempts());
//!     job.delete().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod job;
pub mod message;
pub mod payload;
pub mod queue;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use auth::{
    CredentialCache, CredentialProvider, InMemoryCredentialCache, SasTokenGenerator,
    SharedAccessKey,
};
pub use config::{QueueConnectionsConfig, ServiceBusQueueConfig};
pub use connection::ServiceBusConnection;
pub use connector::{QueueConnector, QueueRegistry, ServiceBusConnector};
pub use error::{
    CacheError, ConfigurationError, LeaseOperation, QueueError, SerializationError,
    TransportError, ValidationError,
};
pub use job::{LeasedJob, ServiceBusJob};
pub use message::{BrokerProperties, Delay, LockLocation, MessageId, QueueName};
pub use payload::{JobDescriptor, JobEnvelope, JsonPayloadBuilder, PayloadBuilder};
pub use queue::{JobQueue, ServiceBusQueue};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
