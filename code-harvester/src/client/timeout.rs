//! Per-call timeouts for messaging clients.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ClientError, ClientFactory, IncomingMessage, MessagingClient, SelfIdentity};

/// Wraps a client so that no call can block longer than `timeout`.
pub struct TimedClient {
    inner: Box<dyn MessagingClient>,
    timeout: Duration,
}

impl TimedClient {
    pub fn new(inner: Box<dyn MessagingClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

async fn bounded<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ClientError::Timeout { op, after })?
}

#[async_trait]
impl MessagingClient for TimedClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        bounded("connect", self.timeout, self.inner.connect()).await
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        bounded("disconnect", self.timeout, self.inner.disconnect()).await
    }

    async fn is_authorized(&mut self) -> Result<bool, ClientError> {
        bounded("is_authorized", self.timeout, self.inner.is_authorized()).await
    }

    async fn request_code(&mut self, phone: &str) -> Result<(), ClientError> {
        bounded("request_code", self.timeout, self.inner.request_code(phone)).await
    }

    async fn sign_in(&mut self, phone: &str, code: &str) -> Result<(), ClientError> {
        bounded("sign_in", self.timeout, self.inner.sign_in(phone, code)).await
    }

    async fn check_password(&mut self, password: &str) -> Result<(), ClientError> {
        bounded(
            "check_password",
            self.timeout,
            self.inner.check_password(password),
        )
        .await
    }

    async fn recent_messages(
        &mut self,
        sender_id: i64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, ClientError> {
        bounded(
            "recent_messages",
            self.timeout,
            self.inner.recent_messages(sender_id, limit),
        )
        .await
    }

    async fn get_self(&mut self) -> Result<SelfIdentity, ClientError> {
        bounded("get_self", self.timeout, self.inner.get_self()).await
    }
}

/// Factory decorator producing [`TimedClient`]s.
pub struct TimedClientFactory {
    inner: Arc<dyn ClientFactory>,
    timeout: Duration,
}

impl TimedClientFactory {
    pub fn new(inner: Arc<dyn ClientFactory>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl ClientFactory for TimedClientFactory {
    fn create(&self, session_name: &str) -> Box<dyn MessagingClient> {
        Box::new(TimedClient::new(
            self.inner.create(session_name),
            self.timeout,
        ))
    }
}
