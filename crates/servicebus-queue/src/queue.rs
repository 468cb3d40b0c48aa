//! Service Bus queue adapter.
//!
//! Maps generic job-queue operations onto the Service Bus REST surface:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | push / later | `POST {base}messages` |
//! | pop | `POST {base}messages/head` (peek-lock) |
//! | size | `GET {base}` (Atom queue description) |
//! | clear | `DELETE {base}messages/head`, once per counted message |
//!
//! Pop and size treat broker or transport failures as "nothing there" and
//! log them; only credential signing failures propagate from those two.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::connection::ServiceBusConnection;
use crate::error::{QueueError, SerializationError};
use crate::job::{LeasedJob, ServiceBusJob};
use crate::message::{BrokerProperties, Delay, LockLocation, QueueName, ScheduleProperties};
use crate::payload::{parse_payload, JobDescriptor, JsonPayloadBuilder, PayloadBuilder};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Content type for peek-lock receive and head deletion
pub const LOCK_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

/// Content type for reading the queue description
pub const DESCRIPTION_CONTENT_TYPE: &str = "application/atom+xml; type=entry";

/// Header carrying broker properties in both directions
pub const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";

// ============================================================================
// JobQueue Trait
// ============================================================================

/// Generic job-queue capability set
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for immediate delivery
    async fn push(&self, job: &JobDescriptor, queue: Option<&QueueName>)
        -> Result<(), QueueError>;

    /// Enqueue an already serialized JSON payload
    async fn push_raw(
        &self,
        payload: &str,
        queue: Option<&QueueName>,
        headers: &[(String, String)],
    ) -> Result<(), QueueError>;

    /// Enqueue a job that becomes visible after `delay`
    async fn later(
        &self,
        delay: Delay,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError>;

    /// Receive the next job under a lock, if any
    async fn pop(
        &self,
        queue: Option<&QueueName>,
    ) -> Result<Option<Box<dyn LeasedJob>>, QueueError>;

    /// Number of messages in the queue; 0 when it cannot be determined
    async fn size(&self, queue: Option<&QueueName>) -> Result<u64, QueueError>;

    /// Delete every counted message, returning how many were removed
    async fn clear(&self, queue: Option<&QueueName>) -> Result<u64, QueueError>;

    /// Name of the configured connection
    fn connection_name(&self) -> &str;
}

// ============================================================================
// ServiceBusQueue
// ============================================================================

/// Job queue backed by one Service Bus queue over REST
///
/// Queue overrides passed to operations reach the payload builder, but
/// requests always target the connection's own queue and handles report it.
pub struct ServiceBusQueue {
    connection: Arc<ServiceBusConnection>,
    transport: Arc<dyn HttpTransport>,
    payload_builder: Arc<dyn PayloadBuilder>,
    connection_name: String,
}

impl ServiceBusQueue {
    /// Create queue over `connection` using `transport` for every request
    pub fn new(connection: Arc<ServiceBusConnection>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            connection,
            transport,
            payload_builder: Arc::new(JsonPayloadBuilder),
            connection_name: "azure-service-bus".to_string(),
        }
    }

    /// Use a custom payload builder
    pub fn with_payload_builder(mut self, payload_builder: Arc<dyn PayloadBuilder>) -> Self {
        self.payload_builder = payload_builder;
        self
    }

    /// Set the connection name reported to jobs
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    /// Underlying broker connection
    pub fn connection(&self) -> &Arc<ServiceBusConnection> {
        &self.connection
    }

    fn note_queue_override(&self, queue: Option<&QueueName>) {
        if let Some(requested) = queue.filter(|q| *q != self.connection.queue()) {
            debug!(
                requested = %requested,
                queue = %self.connection.queue(),
                "Queue override does not change the target entity"
            );
        }
    }

    /// Enqueue a job for immediate delivery
    ///
    /// # Errors
    ///
    /// - `QueueError::PushRejected` if the broker does not answer 201
    /// - `QueueError::Transport` if the request could not be sent
    pub async fn push(
        &self,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        let payload = self.payload_builder.create_payload(job, queue)?;
        self.push_raw(&payload, queue, &[]).await
    }

    /// Enqueue a JSON payload, merging `headers` over the defaults
    #[instrument(skip(self, payload, queue, headers), fields(queue = %self.connection.queue()))]
    pub async fn push_raw(
        &self,
        payload: &str,
        queue: Option<&QueueName>,
        headers: &[(String, String)],
    ) -> Result<(), QueueError> {
        parse_payload(payload)?;
        self.note_queue_override(queue);

        let request = HttpRequest::new(HttpMethod::Post, self.connection.messages_url())
            .with_header("Authorization", self.connection.authorization_header().await?)
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_headers(headers.iter().cloned())
            .with_body(payload.to_string());

        let response = self.transport.send(request).await?;

        if response.status() != 201 {
            let body = response.body_text();
            warn!(status = response.status(), "Broker rejected message");
            return Err(QueueError::PushRejected {
                status: response.status(),
                body,
            });
        }

        debug!(bytes = payload.len(), "Message sent");
        Ok(())
    }

    /// Enqueue a job scheduled to become visible after `delay`
    pub async fn later(
        &self,
        delay: impl Into<Delay>,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        let available_at = delay.into().resolve(Utc::now());
        let schedule = ScheduleProperties::at(available_at)
            .to_header()
            .map_err(SerializationError::JsonError)?;

        let payload = self.payload_builder.create_payload(job, queue)?;
        debug!(available_at = %available_at, "Scheduling message");

        self.push_raw(
            &payload,
            queue,
            &[(BROKER_PROPERTIES_HEADER.to_string(), schedule)],
        )
        .await
    }

    /// Receive the head message under a peek-lock
    ///
    /// Returns `Ok(None)` when the queue is empty or the broker could not be
    /// reached.
    ///
    /// # Errors
    ///
    /// - `QueueError::MalformedResponse` if a message was locked but its
    ///   metadata cannot be used to settle it
    /// - `QueueError::AuthSigningFailure` if no token could be produced
    #[instrument(skip(self, queue), fields(queue = %self.connection.queue()))]
    pub async fn pop(
        &self,
        queue: Option<&QueueName>,
    ) -> Result<Option<ServiceBusJob>, QueueError> {
        self.note_queue_override(queue);

        let request = HttpRequest::new(HttpMethod::Post, self.connection.head_url())
            .with_header("Authorization", self.connection.authorization_header().await?)
            .with_header("Content-Type", LOCK_CONTENT_TYPE);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to receive message");
                return Ok(None);
            }
        };

        if !response.is_success() {
            debug!(status = response.status(), "No message received");
            return Ok(None);
        }

        let Some(raw_properties) = response.header(BROKER_PROPERTIES_HEADER) else {
            return Ok(None);
        };

        let job = self.job_from_response(raw_properties, &response)?;
        info!(
            message_id = %job.job_id(),
            attempts = job.attempts(),
            "Received message"
        );

        Ok(Some(job))
    }

    fn job_from_response(
        &self,
        raw_properties: &str,
        response: &HttpResponse,
    ) -> Result<ServiceBusJob, QueueError> {
        let properties = BrokerProperties::from_header(raw_properties).map_err(|e| {
            QueueError::MalformedResponse {
                message: format!("Invalid BrokerProperties header: {}", e),
            }
        })?;

        let location = response
            .header("Location")
            .ok_or_else(|| QueueError::MalformedResponse {
                message: format!(
                    "Message '{}' was locked without a Location header",
                    properties.message_id
                ),
            })?;

        let lock_location =
            LockLocation::new(location.to_string()).map_err(|e| QueueError::MalformedResponse {
                message: format!("Invalid Location header: {}", e),
            })?;

        Ok(ServiceBusJob::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.transport),
            properties,
            lock_location,
            response.body().clone(),
            self.connection_name.clone(),
            self.connection.queue().clone(),
        ))
    }

    /// Number of messages reported by the queue description
    ///
    /// Any transport, status or parse failure yields 0.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AuthSigningFailure` if no token could be produced.
    #[instrument(skip(self, queue), fields(queue = %self.connection.queue()))]
    pub async fn size(&self, queue: Option<&QueueName>) -> Result<u64, QueueError> {
        self.note_queue_override(queue);

        let request = HttpRequest::new(HttpMethod::Get, self.connection.endpoint_base_uri())
            .with_header("Authorization", self.connection.authorization_header().await?)
            .with_header("Content-Type", DESCRIPTION_CONTENT_TYPE);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to read queue description");
                return Ok(0);
            }
        };

        if !response.is_success() {
            warn!(status = response.status(), "Broker refused queue description");
            return Ok(0);
        }

        match parse_message_count(&response.body_text()) {
            Ok(count) => Ok(count),
            Err(message) => {
                warn!(error = %message, "Failed to parse queue description");
                Ok(0)
            }
        }
    }

    /// Delete as many head messages as `size` reports
    ///
    /// Not atomic: messages arriving meanwhile may survive, and a failure
    /// part-way leaves the rest in place. Re-running resumes the work.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ClearAborted` on the first failed deletion; no
    /// further deletions are attempted.
    #[instrument(skip(self, queue), fields(queue = %self.connection.queue()))]
    pub async fn clear(&self, queue: Option<&QueueName>) -> Result<u64, QueueError> {
        let expected = self.size(queue).await?;
        if expected == 0 {
            return Ok(0);
        }

        let authorization = self.connection.authorization_header().await?;
        let head_url = self.connection.head_url();

        for deleted in 0..expected {
            let request = HttpRequest::new(HttpMethod::Delete, head_url.as_str())
                .with_header("Authorization", authorization.as_str())
                .with_header("Content-Type", LOCK_CONTENT_TYPE);

            let (status, body) = match self.transport.send(request).await {
                Ok(response) if response.is_success() => continue,
                Ok(response) => (Some(response.status()), response.body_text()),
                Err(e) => (None, e.to_string()),
            };

            warn!(deleted, expected, status = ?status, "Clear aborted");
            return Err(QueueError::ClearAborted {
                deleted,
                expected,
                status,
                body,
            });
        }

        info!(deleted = expected, "Queue cleared");
        Ok(expected)
    }
}

/// Read `entry/content/QueueDescription/MessageCount` from an Atom entry
fn parse_message_count(xml: &str) -> Result<u64, String> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    const PATH: [&[u8]; 4] = [b"entry", b"content", b"QueueDescription", b"MessageCount"];

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) if path.iter().map(Vec::as_slice).eq(PATH) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("Failed to read MessageCount: {}", e))?;
                return text
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| format!("Invalid MessageCount '{}': {}", text, e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Err("MessageCount not found in queue description".to_string())
}

#[async_trait]
impl JobQueue for ServiceBusQueue {
    async fn push(
        &self,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        ServiceBusQueue::push(self, job, queue).await
    }

    async fn push_raw(
        &self,
        payload: &str,
        queue: Option<&QueueName>,
        headers: &[(String, String)],
    ) -> Result<(), QueueError> {
        ServiceBusQueue::push_raw(self, payload, queue, headers).await
    }

    async fn later(
        &self,
        delay: Delay,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        ServiceBusQueue::later(self, delay, job, queue).await
    }

    async fn pop(
        &self,
        queue: Option<&QueueName>,
    ) -> Result<Option<Box<dyn LeasedJob>>, QueueError> {
        let job = ServiceBusQueue::pop(self, queue).await?;
        Ok(job.map(|job| Box::new(job) as Box<dyn LeasedJob>))
    }

    async fn size(&self, queue: Option<&QueueName>) -> Result<u64, QueueError> {
        ServiceBusQueue::size(self, queue).await
    }

    async fn clear(&self, queue: Option<&QueueName>) -> Result<u64, QueueError> {
        ServiceBusQueue::clear(self, queue).await
    }

    fn connection_name(&self) -> &str {
        &self.connection_name
    }
}

impl fmt::Debug for ServiceBusQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusQueue")
            .field("connection", &self.connection)
            .field("connection_name", &self.connection_name)
            .finish_non_exhaustive()
    }
}
