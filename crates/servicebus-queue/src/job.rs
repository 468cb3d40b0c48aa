//! Peek-locked message handles.
//!
//! A popped message stays on the broker, locked at a per-message URL, until
//! the handle settles it: [`ServiceBusJob::delete`] removes it for good and
//! [`ServiceBusJob::release`] unlocks it for redelivery. If neither happens the
//! broker unlocks it on its own when the lock duration expires.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::connection::ServiceBusConnection;
use crate::error::{LeaseOperation, QueueError, SerializationError};
use crate::message::{BrokerProperties, LockLocation, QueueName};
use crate::payload::parse_payload;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

// ============================================================================
// LeasedJob Trait
// ============================================================================

/// A job received under a lock that the host must settle
#[async_trait]
pub trait LeasedJob: Send + Sync {
    /// Remove the message from the queue
    async fn delete(&self) -> Result<(), QueueError>;

    /// Unlock the message so it is redelivered after `delay_seconds`
    async fn release(&self, delay_seconds: u64) -> Result<(), QueueError>;

    /// Delivery count reported by the broker when the job was received
    fn attempts(&self) -> u32;

    /// Broker message id
    fn job_id(&self) -> &str;

    /// Message body exactly as received
    fn raw_body(&self) -> &[u8];

    /// Queue the job was popped for
    fn queue(&self) -> &QueueName;

    /// Name of the connection the job came from
    fn connection_name(&self) -> &str;

    /// Whether `delete` has been invoked
    fn is_deleted(&self) -> bool;

    /// Whether `release` has been invoked
    fn is_released(&self) -> bool;

    fn is_deleted_or_released(&self) -> bool {
        self.is_deleted() || self.is_released()
    }

    /// Decode the body as JSON
    fn payload(&self) -> Result<serde_json::Value, QueueError> {
        let text =
            std::str::from_utf8(self.raw_body()).map_err(|_| SerializationError::InvalidUtf8)?;
        parse_payload(text)
    }

    /// `displayName` of the job envelope, falling back to `job`
    fn display_name(&self) -> Option<String> {
        let payload = self.payload().ok()?;
        payload
            .get("displayName")
            .or_else(|| payload.get("job"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// `maxTries` of the job envelope
    fn max_tries(&self) -> Option<u32> {
        envelope_u32(&self.payload().ok()?, "maxTries")
    }

    /// `timeout` of the job envelope, in seconds
    fn timeout(&self) -> Option<u32> {
        envelope_u32(&self.payload().ok()?, "timeout")
    }
}

fn envelope_u32(payload: &serde_json::Value, field: &str) -> Option<u32> {
    payload
        .get(field)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

// ============================================================================
// ServiceBusJob
// ============================================================================

/// Message received with peek-lock from a Service Bus queue
pub struct ServiceBusJob {
    connection: Arc<ServiceBusConnection>,
    transport: Arc<dyn HttpTransport>,
    properties: BrokerProperties,
    lock_location: LockLocation,
    body: Bytes,
    connection_name: String,
    queue: QueueName,
    deleted: AtomicBool,
    released: AtomicBool,
}

impl ServiceBusJob {
    /// Create handle for a received message
    pub fn new(
        connection: Arc<ServiceBusConnection>,
        transport: Arc<dyn HttpTransport>,
        properties: BrokerProperties,
        lock_location: LockLocation,
        body: Bytes,
        connection_name: impl Into<String>,
        queue: QueueName,
    ) -> Self {
        Self {
            connection,
            transport,
            properties,
            lock_location,
            body,
            connection_name: connection_name.into(),
            queue,
            deleted: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// URL of the lock held on this message
    pub fn lock_location(&self) -> &LockLocation {
        &self.lock_location
    }

    /// Full broker metadata captured at receive time
    pub fn broker_properties(&self) -> &BrokerProperties {
        &self.properties
    }

    /// Message body as bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    async fn settle(
        &self,
        operation: LeaseOperation,
        request: HttpRequest,
    ) -> Result<(), QueueError> {
        let authorization = self.connection.authorization_header().await?;
        let response = self
            .transport
            .send(request.with_header("Authorization", authorization))
            .await?;

        if !response.is_success() {
            let body = response.body_text();
            warn!(
                message_id = %self.properties.message_id,
                status = response.status(),
                operation = %operation,
                "Broker rejected lock settlement"
            );
            return Err(QueueError::LeaseOperationFailed {
                operation,
                status: response.status(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl LeasedJob for ServiceBusJob {
    #[instrument(skip(self), fields(queue = %self.queue, message_id = %self.properties.message_id))]
    async fn delete(&self) -> Result<(), QueueError> {
        self.deleted.store(true, Ordering::SeqCst);

        let request = HttpRequest::new(HttpMethod::Delete, self.lock_location.as_str());
        self.settle(LeaseOperation::Delete, request).await?;

        debug!("Deleted locked message");
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue, message_id = %self.properties.message_id))]
    async fn release(&self, delay_seconds: u64) -> Result<(), QueueError> {
        self.released.store(true, Ordering::SeqCst);

        let request = HttpRequest::new(
            HttpMethod::Put,
            self.lock_location.release_url(delay_seconds),
        );
        self.settle(LeaseOperation::Release, request).await?;

        debug!("Released locked message");
        Ok(())
    }

    fn attempts(&self) -> u32 {
        self.properties.delivery_count
    }

    fn job_id(&self) -> &str {
        &self.properties.message_id
    }

    fn raw_body(&self) -> &[u8] {
        &self.body
    }

    fn queue(&self) -> &QueueName {
        &self.queue
    }

    fn connection_name(&self) -> &str {
        &self.connection_name
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ServiceBusJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusJob")
            .field("message_id", &self.properties.message_id)
            .field("delivery_count", &self.properties.delivery_count)
            .field("lock_location", &self.lock_location)
            .field("queue", &self.queue)
            .field("connection_name", &self.connection_name)
            .field("body_len", &self.body.len())
            .finish()
    }
}
