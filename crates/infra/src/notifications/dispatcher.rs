use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// A push notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("push provider rejected the message: {0}")]
    Rejected(String),

    #[error("push provider unavailable: {0}")]
    Unavailable(String),
}

/// Outbound push delivery.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<(), DispatchError>;
}

#[async_trait]
impl<D> NotificationDispatcher for Arc<D>
where
    D: NotificationDispatcher + ?Sized,
{
    async fn send(&self, message: PushMessage) -> Result<(), DispatchError> {
        (**self).send(message).await
    }
}

/// Dispatcher that only logs what it would send.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn send(&self, message: PushMessage) -> Result<(), DispatchError> {
        info!(title = %message.title, body = %message.body, "push notification (log only)");
        Ok(())
    }
}

/// In-memory dispatcher for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    sent: Mutex<Vec<PushMessage>>,
    failing: Mutex<bool>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryDispatcher {
    async fn send(&self, message: PushMessage) -> Result<(), DispatchError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DispatchError::Unavailable("injected dispatch failure".to_string()));
        }
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(message);
        Ok(())
    }
}
