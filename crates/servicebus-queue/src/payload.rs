//! Job payload envelopes.
//!
//! The queue transports opaque JSON payloads. How an application job turns
//! into that JSON belongs to the host; [`PayloadBuilder`] is the seam, and
//! [`JsonPayloadBuilder`] produces the standard [`JobEnvelope`].

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, SerializationError};
use crate::message::QueueName;

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;

/// Application-level description of a job to enqueue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Handler the worker should dispatch to
    pub job: String,
    /// Human-readable name; defaults to `job`
    pub display_name: Option<String>,
    /// Handler arguments
    pub data: serde_json::Value,
    /// Maximum delivery attempts the worker should allow
    pub max_tries: Option<u32>,
    /// Processing timeout in seconds
    pub timeout: Option<u32>,
}

impl JobDescriptor {
    /// Create descriptor for `job` with arguments `data`
    pub fn new(job: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            job: job.into(),
            display_name: None,
            data,
            max_tries: None,
            timeout: None,
        }
    }

    /// Set display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set maximum attempts
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Set processing timeout in seconds
    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Display name, falling back to the handler name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.job)
    }
}

/// Wire envelope carried in the message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub uuid: String,
    pub display_name: String,
    pub job: String,
    #[serde(default)]
    pub max_tries: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Turns job descriptors into JSON payload strings
pub trait PayloadBuilder: Send + Sync {
    /// Build the payload for `job`, optionally targeting `queue`
    fn create_payload(
        &self,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<String, QueueError>;
}

/// Default builder emitting a [`JobEnvelope`] with a fresh uuid
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadBuilder;

impl PayloadBuilder for JsonPayloadBuilder {
    fn create_payload(
        &self,
        job: &JobDescriptor,
        _queue: Option<&QueueName>,
    ) -> Result<String, QueueError> {
        let envelope = JobEnvelope {
            uuid: uuid::Uuid::new_v4().to_string(),
            display_name: job.display_name().to_string(),
            job: job.job.clone(),
            max_tries: job.max_tries,
            timeout: job.timeout,
            data: job.data.clone(),
        };

        serde_json::to_string(&envelope)
            .map_err(|e| QueueError::Serialization(SerializationError::JsonError(e)))
    }
}

/// Parse a raw payload string, requiring valid JSON
pub fn parse_payload(payload: &str) -> Result<serde_json::Value, QueueError> {
    serde_json::from_str(payload).map_err(|e| {
        QueueError::Serialization(SerializationError::InvalidPayload {
            message: e.to_string(),
        })
    })
}
