use std::time::Duration;

use crate::config::{Destination, NotificationsConfig};
use crate::models::{ChangeEvent, EventKind, ProductSnapshot};
use crate::utils::error::{AppError, DispatchError};

use super::notifiers::{DiscordNotifier, LogNotifier, TelegramNotifier};
use super::traits::{NotificationMessage, NotificationResult, NotifierPlugin};

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Renders change events into the text every channel shares.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    currency_symbol: String,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new("₹")
    }
}

impl MessageFormatter {
    pub fn new(currency_symbol: impl Into<String>) -> Self {
        Self {
            currency_symbol: currency_symbol.into(),
        }
    }

    pub fn headline(kind: EventKind) -> &'static str {
        match kind {
            EventKind::Unseen => "🆕 NEW LISTING!",
            EventKind::RestockedSinceOutOfStock => "🔥 IN STOCK ALERT!",
            EventKind::CouponQualifying => "🏷 COUPON DEAL!",
        }
    }

    /// `₹799.00 (was ₹999.00)`; the list price only shows when it is higher.
    pub fn format_price(&self, snapshot: &ProductSnapshot) -> Option<String> {
        let price = snapshot.price?;
        let mut text = format!("{}{:.2}", self.currency_symbol, price);
        if let Some(list_price) = snapshot.list_price.filter(|list| *list > price) {
            text.push_str(&format!(" (was {}{:.2})", self.currency_symbol, list_price));
        }
        Some(text)
    }

    pub fn format_stock(snapshot: &ProductSnapshot) -> String {
        let stock = snapshot.aggregate_stock();
        let labels = snapshot.in_stock_variant_labels();
        if labels.is_empty() {
            stock.to_string()
        } else {
            format!("{} ({})", stock, labels.join(", "))
        }
    }

    pub fn render(&self, event: &ChangeEvent) -> NotificationMessage {
        let snapshot = &event.snapshot;
        let headline = Self::headline(event.kind);
        let price = self.format_price(snapshot);
        let stock = Self::format_stock(snapshot);

        let mut text = format!("{}\n\n🛍 {}\n", headline, snapshot.name);
        if let Some(price) = &price {
            text.push_str(&format!("💰 Price: {}\n", price));
        }
        text.push_str(&format!("📦 Stock: {}\n\n🔗 Buy Now:\n{}", stock, snapshot.url));

        NotificationMessage {
            kind: event.kind,
            product_id: snapshot.id.clone(),
            headline: headline.to_string(),
            product_name: snapshot.name.clone(),
            price,
            stock: Some(stock),
            link: snapshot.url.clone(),
            text,
        }
    }
}

/// Delivers change events to the one configured notification channel.
pub struct Dispatcher {
    notifier: NotifierPluginBox,
    formatter: MessageFormatter,
}

impl Dispatcher {
    pub fn new(notifier: NotifierPluginBox, formatter: MessageFormatter) -> Self {
        Self { notifier, formatter }
    }

    /// Build the dispatcher for the configured destination. A dry run always
    /// logs instead of sending.
    pub fn from_config(config: &NotificationsConfig, dry_run: bool) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.request_timeout);
        let destination = if dry_run { Destination::Log } else { config.destination };

        let notifier: NotifierPluginBox = match destination {
            Destination::Telegram => Box::new(
                TelegramNotifier::from_config(&config.telegram, timeout).map_err(|e| plugin_error("telegram", e))?,
            ),
            Destination::Discord => Box::new(
                DiscordNotifier::from_config(&config.discord, timeout).map_err(|e| plugin_error("discord", e))?,
            ),
            Destination::Log => Box::new(LogNotifier::new()),
        };

        tracing::info!(notifier = notifier.name(), "Notification channel ready");
        Ok(Self::new(notifier, MessageFormatter::new(config.currency_symbol.clone())))
    }

    pub fn destination(&self) -> &str {
        self.notifier.plugin_type()
    }

    pub fn format_message(&self, event: &ChangeEvent) -> NotificationMessage {
        self.formatter.render(event)
    }

    /// Send one event. Failures are returned to the caller, never retried.
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<NotificationResult, DispatchError> {
        let message = self.format_message(event);
        match self.notifier.notify(&message).await {
            Ok(result) => {
                tracing::info!(product_id = %message.product_id, kind = %message.kind, "Notification sent");
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(
                    product_id = %message.product_id,
                    kind = %message.kind,
                    destination = self.destination(),
                    "Notification failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.notifier.shutdown().await {
            tracing::warn!("Error shutting down notifier plugin: {}", e);
        }
    }
}

fn plugin_error(plugin_type: &str, error: DispatchError) -> AppError {
    AppError::Plugin {
        plugin_type: plugin_type.to_string(),
        message: error.to_string(),
    }
}
