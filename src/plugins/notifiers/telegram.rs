use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::plugins::traits::{NotificationMessage, NotificationResult, NotifierPlugin};
use crate::utils::error::DispatchError;

/// Extra time on top of a long-poll timeout before the HTTP request itself gives up.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

/// Thin client for the handful of Bot API methods the watcher uses.
///
/// The bot token is part of every request URL, so transport errors are
/// stripped of their URL before they are surfaced.
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base: String,
}

impl TelegramApi {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self, DispatchError> {
        if bot_token.trim().is_empty() {
            return Err(DispatchError::Config("telegram bot token is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token.trim()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, DispatchError> {
        let mut request = self.client.post(format!("{}/{}", self.base, method)).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| DispatchError::Rejected {
            status: status.as_u16(),
            body: format!("unreadable response: {}", e),
        })?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: parsed.description.unwrap_or(body),
            }),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&[Vec<InlineButton>]>,
    ) -> Result<Message, DispatchError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": false,
        });
        if let Some(rows) = keyboard {
            payload["reply_markup"] = json!({ "inline_keyboard": rows });
        }
        self.call("sendMessage", &payload, None).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, DispatchError> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let timeout = Duration::from_secs(timeout_secs) + LONG_POLL_GRACE;
        self.call("getUpdates", &payload, Some(timeout)).await
    }

    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<(), DispatchError> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &payload, None).await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        keyboard: Option<&[Vec<InlineButton>]>,
    ) -> Result<(), DispatchError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(rows) = keyboard {
            payload["reply_markup"] = json!({ "inline_keyboard": rows });
        }
        // Telegram answers with the edited message, or `true` for inline messages.
        let _: Value = self.call("editMessageText", &payload, None).await?;
        Ok(())
    }
}

pub struct TelegramNotifier {
    api: TelegramApi,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api: TelegramApi, chat_id: impl Into<String>) -> Self {
        Self {
            api,
            chat_id: chat_id.into(),
        }
    }

    pub fn from_config(config: &TelegramConfig, timeout: Duration) -> Result<Self, DispatchError> {
        let token = config
            .bot_token
            .as_deref()
            .ok_or_else(|| DispatchError::Config("telegram.bot_token is not set".to_string()))?;
        let chat_id = config
            .chat_id
            .as_deref()
            .ok_or_else(|| DispatchError::Config("telegram.chat_id is not set".to_string()))?;

        Ok(Self::new(TelegramApi::new(&config.api_base, token, timeout)?, chat_id))
    }
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn name(&self) -> &str {
        "Telegram Notifier"
    }

    fn plugin_type(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<NotificationResult, DispatchError> {
        let sent = self.api.send_message(&self.chat_id, &message.text, None).await?;
        Ok(NotificationResult::delivered(Some(sent.message_id.to_string())))
    }
}
