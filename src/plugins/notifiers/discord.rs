use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::DiscordConfig;
use crate::models::EventKind;
use crate::plugins::traits::{NotificationMessage, NotificationResult, NotifierPlugin};
use crate::utils::error::DispatchError;

const WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: String,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, username: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Config(e.to_string()))?;

        Ok(DiscordNotifier {
            client,
            webhook_url: webhook_url.into(),
            username: username.into(),
            avatar_url: None,
        })
    }

    pub fn from_config(config: &DiscordConfig, timeout: Duration) -> Result<Self, DispatchError> {
        let webhook_url = config
            .webhook_url
            .as_deref()
            .ok_or_else(|| DispatchError::Config("discord.webhook_url is not set".to_string()))?;

        if !webhook_url.starts_with(WEBHOOK_PREFIX) {
            return Err(DispatchError::Config("Invalid Discord webhook URL format".to_string()));
        }

        let mut notifier = Self::new(webhook_url, config.username.clone(), timeout)?;
        notifier.avatar_url = config.avatar_url.clone();
        Ok(notifier)
    }

    fn get_embed_color(&self, kind: EventKind) -> u32 {
        match kind {
            EventKind::Unseen => 0x0099ff,                   // Blue for new listings
            EventKind::RestockedSinceOutOfStock => 0x00ff00, // Green for restocks
            EventKind::CouponQualifying => 0xff9900,         // Orange for deals
        }
    }

    fn get_emoji(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Unseen => "🆕",
            EventKind::RestockedSinceOutOfStock => "🔥",
            EventKind::CouponQualifying => "🏷",
        }
    }

    fn create_embed(&self, message: &NotificationMessage) -> serde_json::Value {
        let mut fields = Vec::new();

        if let Some(price) = &message.price {
            fields.push(json!({ "name": "💰 Price", "value": price, "inline": true }));
        }
        if let Some(stock) = &message.stock {
            fields.push(json!({ "name": "📦 Stock", "value": stock, "inline": true }));
        }

        json!({
            "title": format!("{} {}", self.get_emoji(message.kind), message.product_name),
            "description": message.headline,
            "url": message.link,
            "color": self.get_embed_color(message.kind),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "fields": fields,
            "footer": { "text": self.username },
        })
    }

    fn create_webhook_payload(&self, message: &NotificationMessage) -> serde_json::Value {
        let mut payload = json!({
            "username": self.username,
            "embeds": [self.create_embed(message)]
        });

        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<NotificationResult, DispatchError> {
        let payload = self.create_webhook_payload(message);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(NotificationResult::delivered(None))
    }
}
