use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::EventKind;
use crate::utils::error::DispatchError;

/// A change event rendered for humans. Every notifier receives the same
/// rendering and decides how to lay it out for its channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationMessage {
    pub kind: EventKind,
    pub product_id: String,
    pub headline: String,
    pub product_name: String,
    pub price: Option<String>,
    pub stock: Option<String>,
    pub link: String,
    /// Plain-text body for text-only channels.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
        }
    }
}

/// Trait for implementing notification channels (Telegram, Discord, etc.)
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    /// Deliver one message. Implementations must not retry.
    async fn notify(&self, message: &NotificationMessage) -> Result<NotificationResult, DispatchError>;

    /// Plugin lifecycle
    async fn shutdown(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
