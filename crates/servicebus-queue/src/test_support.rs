//! Scripted transport and fixtures shared by unit tests.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::auth::{CredentialCache, InMemoryCredentialCache, SharedAccessKey};
use crate::connection::ServiceBusConnection;
use crate::error::{CacheError, TransportError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Transport that replays scripted outcomes in order and records every request.
///
/// When the script runs out, requests fail with a connection error.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub(crate) fn respond(self, response: HttpResponse) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue a transport failure
    pub(crate) fn fail(self, error: TransportError) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(error));
        self
    }

    /// Requests sent so far
    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::ConnectionFailed {
                    message: "no scripted response".to_string(),
                })
            })
    }
}

/// Credential cache whose backing store is unreachable
pub(crate) struct FailingCache;

impl FailingCache {
    fn unavailable() -> CacheError {
        CacheError::OperationFailed {
            message: "cache unavailable".to_string(),
        }
    }
}

#[async_trait]
impl CredentialCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(Self::unavailable())
    }

    async fn store(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(Self::unavailable())
    }

    async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
        Err(Self::unavailable())
    }

    fn cleanup_expired(&self) {}
}

/// Connection for `contoso`/`jobs` with a private credential cache
pub(crate) fn create_test_connection() -> Arc<ServiceBusConnection> {
    create_test_connection_with_cache(Arc::new(InMemoryCredentialCache::new()))
}

/// Connection for `contoso`/`jobs` backed by `cache`
pub(crate) fn create_test_connection_with_cache(
    cache: Arc<dyn CredentialCache>,
) -> Arc<ServiceBusConnection> {
    Arc::new(
        ServiceBusConnection::new(
            "contoso",
            "jobs",
            "send-listen",
            SharedAccessKey::new("secret"),
        )
        .expect("test connection should be valid")
        .with_cache(cache),
    )
}

/// Atom entry returned by the broker for a queue description
pub(crate) fn queue_description_xml(message_count: u64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="http://www.w3.org/2005/Atom">
  <id>https://contoso.servicebus.windows.net/jobs</id>
  <title type="text">jobs</title>
  <content type="application/xml">
    <QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <LockDuration>PT1M</LockDuration>
      <MaxSizeInMegabytes>1024</MaxSizeInMegabytes>
      <SizeInBytes>512</SizeInBytes>
      <MessageCount>{}</MessageCount>
      <CountDetails xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">
        <d2p1:ActiveMessageCount>{}</d2p1:ActiveMessageCount>
        <d2p1:DeadLetterMessageCount>0</d2p1:DeadLetterMessageCount>
      </CountDetails>
    </QueueDescription>
  </content>
</entry>"#,
        message_count, message_count
    )
}
