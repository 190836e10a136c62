use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub detector: DetectorConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub control: ControlConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

impl QueryParam {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: String,
    /// Site origin used for relative product links and the Referer header.
    pub origin: String,
    pub query: Vec<QueryParam>,
    pub page_param: String,
    pub max_pages: u32,
    pub request_timeout: u64,
    pub user_agents: Vec<String>,
    /// JSON pointer to the products array inside a page body.
    pub products_pointer: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.sheinindia.in/api/category/sverse-5939-37961".to_string(),
            origin: "https://www.sheinindia.in".to_string(),
            query: vec![
                QueryParam::new("fields", "SITE"),
                QueryParam::new("pageSize", "40"),
                QueryParam::new("format", "json"),
                QueryParam::new("query", ":relevance:genderfilter:Men"),
                QueryParam::new("facets", "genderfilter:Men"),
                QueryParam::new("platform", "Desktop"),
            ],
            page_param: "currentPage".to_string(),
            max_pages: 2,
            request_timeout: 10,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
                "Mozilla/5.0 (Linux; Android 13)".to_string(),
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X)".to_string(),
            ],
            products_pointer: "/info/products".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub notify_new_listings: bool,
    pub coupon_alerts: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            notify_new_listings: true,
            coupon_alerts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 12,
            initial_delay_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Telegram,
    Discord,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub destination: Destination,
    pub request_timeout: u64,
    pub currency_symbol: String,
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            destination: Destination::Telegram,
            request_timeout: 10,
            currency_symbol: "₹".to_string(),
            telegram: TelegramConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "Restock Watcher".to_string(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    /// Used only when no persisted flag exists yet.
    pub alerts_enabled_on_start: bool,
    pub poll_timeout_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alerts_enabled_on_start: false,
            poll_timeout_secs: 25,
            error_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Json,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: "data/seen_products.json".to_string(),
            url: "sqlite://data/restock-watcher.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "restock_watcher=info".to_string(),
            directory: None,
            file_prefix: "restock-watcher.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new("config"))
    }

    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_unchecked(config_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the config sources without validating, so callers can apply
    /// command-line overrides before calling [`AppConfig::validate`].
    pub fn load_unchecked(config_dir: &Path) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default")).required(false))
            // Add environment-specific config
            .add_source(File::from(config_dir.join(&run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::from(config_dir.join("local")).required(false))
            // Add environment variables with prefix "RESTOCK_"
            .add_source(Environment::with_prefix("RESTOCK").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_secret_env();
        Ok(config)
    }

    /// Fill bot credentials from the conventional environment variables when
    /// the config files leave them unset.
    fn apply_secret_env(&mut self) {
        let telegram = &mut self.notifications.telegram;
        if telegram.bot_token.is_none() {
            telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN")
                .or_else(|_| env::var("BOT_TOKEN"))
                .ok()
                .filter(|token| !token.trim().is_empty());
        }
        if telegram.chat_id.is_none() {
            telegram.chat_id = env::var("TELEGRAM_CHAT_ID")
                .ok()
                .filter(|chat| !chat.trim().is_empty());
        }
        if self.notifications.discord.webhook_url.is_none() {
            self.notifications.discord.webhook_url = env::var("DISCORD_WEBHOOK_URL").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate feed configuration
        if Url::parse(&self.feed.endpoint).is_err() {
            return Err(ConfigError::Message("Invalid feed endpoint URL".into()));
        }

        if Url::parse(&self.feed.origin).is_err() {
            return Err(ConfigError::Message("Invalid feed origin URL".into()));
        }

        if self.feed.max_pages == 0 {
            return Err(ConfigError::Message("Feed max_pages must be greater than 0".into()));
        }

        if self.feed.request_timeout == 0 {
            return Err(ConfigError::Message("Feed request_timeout must be greater than 0".into()));
        }

        if self.feed.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Message("Feed user_agents must contain at least one entry".into()));
        }

        if self.feed.page_param.trim().is_empty() {
            return Err(ConfigError::Message("Feed page_param must not be empty".into()));
        }

        if !self.feed.products_pointer.is_empty() && !self.feed.products_pointer.starts_with('/') {
            return Err(ConfigError::Message("Feed products_pointer must start with '/'".into()));
        }

        // Validate scheduler configuration
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler interval_secs must be greater than 0".into()));
        }

        // Validate notification configuration
        if self.notifications.request_timeout == 0 {
            return Err(ConfigError::Message("Notification request_timeout must be greater than 0".into()));
        }

        match self.notifications.destination {
            Destination::Telegram => self.require_telegram("Telegram destination")?,
            Destination::Discord => {
                let webhook = self.notifications.discord.webhook_url.as_deref().unwrap_or("");
                if !webhook.starts_with("https://discord.com/api/webhooks/") {
                    return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
                }
            }
            Destination::Log => {}
        }

        // Validate control configuration
        if self.control.enabled {
            self.require_telegram("Telegram control")?;
            if self.control.poll_timeout_secs == 0 {
                return Err(ConfigError::Message("Control poll_timeout_secs must be greater than 0".into()));
            }
        }

        // Validate storage configuration
        match self.storage.backend {
            StorageBackend::Json if self.storage.path.trim().is_empty() => {
                return Err(ConfigError::Message("Storage path is required for the json backend".into()));
            }
            StorageBackend::Sqlite if !self.storage.url.starts_with("sqlite:") => {
                return Err(ConfigError::Message("Storage url must be a sqlite: URL".into()));
            }
            _ => {}
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    fn require_telegram(&self, what: &str) -> Result<(), ConfigError> {
        let telegram = &self.notifications.telegram;
        if telegram.bot_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ConfigError::Message(format!(
                "{what} requires a bot token (set TELEGRAM_BOT_TOKEN)"
            )));
        }
        if telegram.chat_id.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(ConfigError::Message(format!(
                "{what} requires a chat id (set TELEGRAM_CHAT_ID)"
            )));
        }
        if Url::parse(&telegram.api_base).is_err() {
            return Err(ConfigError::Message("Invalid Telegram api_base URL".into()));
        }
        Ok(())
    }
}
