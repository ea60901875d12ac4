// src/notify/mod.rs
//! Delivery collaborator: one outbound channel, typed failures so the
//! publisher can tell rate limiting from terminal errors.

pub mod telegram;

use std::time::Duration;

pub use telegram::TelegramDeliverer;

/// How the channel should interpret the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// Telegram's HTML subset (`<b>`, `<a>`, ...).
    #[default]
    RichText,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("delivery timed out")]
    Timeout,
    #[error("rejected by channel: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
}

impl DeliveryError {
    /// Health penalty when this error is the one that exhausts the budget.
    pub fn penalty(&self) -> i64 {
        match self {
            DeliveryError::Rejected(_) => 2,
            _ => 1,
        }
    }
}

/// `send(channel_id, message, content_type, preview)`
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync {
    async fn send(
        &self,
        channel_id: &str,
        message: &str,
        content_type: ContentType,
        preview: bool,
    ) -> Result<(), DeliveryError>;
}
