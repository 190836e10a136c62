use std::time::Duration;
use tokio::sync::watch;

use super::{Command, ControlSurface, Reply};
use crate::config::{ControlConfig, TelegramConfig};
use crate::plugins::notifiers::telegram::{CallbackQuery, Chat, InlineButton, Message, TelegramApi, Update};
use crate::utils::error::DispatchError;

/// Long-polls the Bot API for operator commands from one chat.
pub struct TelegramControl {
    api: TelegramApi,
    chat_id: String,
    surface: ControlSurface,
    poll_timeout_secs: u64,
    error_backoff: Duration,
    offset: Option<i64>,
}

impl TelegramControl {
    pub fn new(api: TelegramApi, chat_id: impl Into<String>, surface: ControlSurface, config: &ControlConfig) -> Self {
        Self {
            api,
            chat_id: chat_id.into(),
            surface,
            poll_timeout_secs: config.poll_timeout_secs,
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            offset: None,
        }
    }

    pub fn from_config(
        telegram: &TelegramConfig,
        control: &ControlConfig,
        request_timeout: Duration,
        surface: ControlSurface,
    ) -> Result<Self, DispatchError> {
        let token = telegram
            .bot_token
            .as_deref()
            .ok_or_else(|| DispatchError::Config("telegram.bot_token is not set".to_string()))?;
        let chat_id = telegram
            .chat_id
            .as_deref()
            .ok_or_else(|| DispatchError::Config("telegram.chat_id is not set".to_string()))?;

        let api = TelegramApi::new(&telegram.api_base, token, request_timeout)?;
        Ok(Self::new(api, chat_id, surface, control))
    }

    pub fn menu_keyboard() -> Vec<Vec<InlineButton>> {
        vec![
            vec![InlineButton::new("✅ Alerts ON", "on"), InlineButton::new("⛔ Alerts OFF", "off")],
            vec![InlineButton::new("📊 Status", "status")],
        ]
    }

    /// Poll until the shutdown signal flips. Errors back off and retry.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(chat_id = %self.chat_id, "Telegram control started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.poll_once() => {
                    if let Err(e) = result {
                        tracing::warn!("Telegram control poll failed: {}", e);
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(self.error_backoff) => {}
                        }
                    }
                }
            }
        }

        tracing::info!("Telegram control stopped");
    }

    /// Fetch one batch of updates and handle them. Returns how many updates
    /// were consumed.
    pub async fn poll_once(&mut self) -> Result<usize, DispatchError> {
        let updates = self.api.get_updates(self.offset, self.poll_timeout_secs).await?;

        for update in &updates {
            self.offset = Some(self.offset.map_or(update.update_id + 1, |o| o.max(update.update_id + 1)));
            if let Err(e) = self.handle_update(update).await {
                tracing::warn!(update_id = update.update_id, "Failed to answer control update: {}", e);
            }
        }

        Ok(updates.len())
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    fn is_authorized(&self, chat: &Chat) -> bool {
        chat.id.to_string() == self.chat_id
    }

    async fn handle_update(&self, update: &Update) -> Result<(), DispatchError> {
        if let Some(message) = &update.message {
            return self.handle_message(message).await;
        }
        if let Some(callback) = &update.callback_query {
            return self.handle_callback(callback).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: &Message) -> Result<(), DispatchError> {
        if !self.is_authorized(&message.chat) {
            tracing::warn!(chat_id = message.chat.id, "Ignoring message from unauthorized chat");
            return Ok(());
        }

        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return Ok(());
        };

        let reply = self.surface.handle(command).await;
        self.send_reply(&reply).await
    }

    async fn handle_callback(&self, callback: &CallbackQuery) -> Result<(), DispatchError> {
        let Some(message) = &callback.message else {
            return Ok(());
        };
        if !self.is_authorized(&message.chat) {
            tracing::warn!(chat_id = message.chat.id, "Ignoring button press from unauthorized chat");
            return Ok(());
        }

        let Some(command) = callback.data.as_deref().and_then(Command::from_callback) else {
            self.api.answer_callback_query(&callback.id, None).await?;
            return Ok(());
        };

        let reply = self.surface.handle(command).await;
        self.api.answer_callback_query(&callback.id, None).await?;

        let keyboard = Self::menu_keyboard();
        self.api
            .edit_message_text(&self.chat_id, message.message_id, &reply.text, Some(keyboard.as_slice()))
            .await
    }

    async fn send_reply(&self, reply: &Reply) -> Result<(), DispatchError> {
        let keyboard = reply.with_menu.then(Self::menu_keyboard);
        self.api
            .send_message(&self.chat_id, &reply.text, keyboard.as_deref())
            .await?;
        Ok(())
    }
}
