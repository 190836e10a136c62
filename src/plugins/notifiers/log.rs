use async_trait::async_trait;

use crate::plugins::traits::{NotificationMessage, NotificationResult, NotifierPlugin};
use crate::utils::error::DispatchError;

/// Writes notifications to the log instead of an external channel. Used for
/// dry runs and local setups without credentials.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifierPlugin for LogNotifier {
    fn name(&self) -> &str {
        "Log Notifier"
    }

    fn plugin_type(&self) -> &str {
        "log"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<NotificationResult, DispatchError> {
        tracing::info!(
            target: "restock_watcher::notifications",
            kind = %message.kind,
            product_id = %message.product_id,
            "{}",
            message.text
        );
        Ok(NotificationResult::delivered(None))
    }
}
