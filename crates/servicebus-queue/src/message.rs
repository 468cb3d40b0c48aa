//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated Service Bus queue (entity) name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        // Validate length
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        // Entity paths allow letters, digits, periods, hyphens, underscores and slashes
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '-', '_', '.' and '/' allowed".to_string(),
            });
        }

        let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
        let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "must start and end with a letter or number".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Broker-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Absolute URL of one peek-locked message instance
///
/// Returned by the broker in the `Location` header of a successful receive and
/// required to delete or unlock that message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockLocation(String);

impl LockLocation {
    /// Create lock location, requiring an absolute http(s) URL
    pub fn new(location: String) -> Result<Self, ValidationError> {
        let parsed = url::Url::parse(&location).map_err(|e| ValidationError::InvalidFormat {
            field: "lock_location".to_string(),
            message: e.to_string(),
        })?;

        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(ValidationError::InvalidFormat {
                field: "lock_location".to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self(location))
    }

    /// URL used to unlock the message so it is redelivered after `delay_seconds`
    pub fn release_url(&self, delay_seconds: u64) -> String {
        format!("{}?timeout={}", self.0, delay_seconds)
    }

    /// Get location as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Broker Properties
// ============================================================================

/// Metadata the broker attaches to a received message (`BrokerProperties` header)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerProperties {
    pub delivery_count: u32,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_time_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl BrokerProperties {
    /// Parse the raw header value
    pub fn from_header(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

/// Outgoing broker properties used to schedule a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduleProperties {
    pub scheduled_enqueue_time_utc: String,
}

impl ScheduleProperties {
    /// Schedule for the given instant, formatted as ISO-8601 with a `+00:00` offset
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            scheduled_enqueue_time_utc: instant.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }

    /// Header value (`BrokerProperties`) for this schedule
    pub fn to_header(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Delays
// ============================================================================

/// Delay before a scheduled message becomes visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Number of seconds from now
    Seconds(u64),
    /// Relative duration from now
    Duration(Duration),
    /// Absolute instant
    Until(DateTime<Utc>),
}

impl Delay {
    /// Resolve to whole seconds from `now`; instants in the past resolve to zero
    pub fn seconds_from(&self, now: DateTime<Utc>) -> i64 {
        let seconds = match self {
            Self::Seconds(s) => i64::try_from(*s).unwrap_or(i64::MAX),
            Self::Duration(d) => d.num_seconds(),
            Self::Until(at) => (*at - now).num_seconds(),
        };
        seconds.max(0)
    }

    /// Instant at which the delay elapses, measured from `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_seconds(self.seconds_from(now))
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl From<u64> for Delay {
    fn from(seconds: u64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Self::Duration(duration)
    }
}

impl From<DateTime<Utc>> for Delay {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::Until(instant)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
