//! Operator commands: turn alerts on and off, ask for status.
//!
//! [`ControlSurface`] is transport-agnostic; [`telegram::TelegramControl`]
//! feeds it commands from a bot chat.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::storage::StateStore;
use crate::watcher::{CycleSummary, StateHandle};

pub mod telegram;

pub use telegram::TelegramControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    Status,
    Menu,
    Help,
}

impl Command {
    /// Parse a chat message. Accepts `/cmd`, `/cmd@bot_name` and, for the
    /// toggle and status commands, the bare word.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.to_lowercase();
        let word = word.split('@').next().unwrap_or_default();

        match word {
            "/on" | "on" | "/enable" | "enable" => Some(Command::Enable),
            "/off" | "off" | "/disable" | "disable" => Some(Command::Disable),
            "/status" | "status" => Some(Command::Status),
            "/start" | "/menu" => Some(Command::Menu),
            "/help" => Some(Command::Help),
            _ => None,
        }
    }

    /// Inline keyboard button payloads.
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "on" => Some(Command::Enable),
            "off" => Some(Command::Disable),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub with_menu: bool,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            with_menu: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub alerts_enabled: bool,
    pub tracked: usize,
    pub in_stock: usize,
    pub notified: usize,
    pub last_cycle: Option<CycleSummary>,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "📊 Status")?;
        writeln!(f, "Alerts: {}", if self.alerts_enabled { "ON ✅" } else { "OFF ⛔" })?;
        writeln!(f, "Tracked products: {}", self.tracked)?;
        writeln!(f, "In stock: {}", self.in_stock)?;
        writeln!(f, "Notifications recorded: {}", self.notified)?;
        match &self.last_cycle {
            Some(cycle) => write!(
                f,
                "Last cycle: {} ({} pages ok, {} failed, {} products, {} events, {} sent, {} failed)",
                cycle.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
                cycle.pages_ok,
                cycle.pages_failed,
                cycle.products,
                cycle.events,
                cycle.sent,
                cycle.failed
            ),
            None => write!(f, "Last cycle: not run yet"),
        }
    }
}

const HELP_TEXT: &str = "Commands:\n\
/on - enable alerts\n\
/off - disable alerts\n\
/status - show tracking status\n\
/menu - show the control buttons";

#[derive(Clone)]
pub struct ControlSurface {
    state: StateHandle,
    store: Arc<dyn StateStore>,
}

impl ControlSurface {
    pub fn new(state: StateHandle, store: Arc<dyn StateStore>) -> Self {
        Self { state, store }
    }

    pub async fn handle(&self, command: Command) -> Reply {
        tracing::debug!(?command, "Handling control command");
        match command {
            Command::Enable => self.set_alerts(true).await,
            Command::Disable => self.set_alerts(false).await,
            Command::Status => Reply::plain(self.status().await.to_string()),
            Command::Help => Reply::plain(HELP_TEXT),
            Command::Menu => {
                let enabled = self.state.alerts_enabled().await;
                Reply {
                    text: format!(
                        "🛍 Restock Watcher\nAlerts are {}.",
                        if enabled { "ON" } else { "OFF" }
                    ),
                    with_menu: true,
                }
            }
        }
    }

    pub async fn status(&self) -> StatusReport {
        let (alerts_enabled, tracked, in_stock, notified) = {
            let state = self.state.read().await;
            (
                state.alerts_enabled(),
                state.tracked_count(),
                state.in_stock_count(),
                state.notified_count(),
            )
        };

        StatusReport {
            alerts_enabled,
            tracked,
            in_stock,
            notified,
            last_cycle: self.state.last_cycle().await,
        }
    }

    async fn set_alerts(&self, enabled: bool) -> Reply {
        let previous = self.state.set_alerts_enabled(enabled).await;
        let word = if enabled { "enabled" } else { "disabled" };

        let mut text = if previous == enabled {
            format!("Alerts are already {}.", word)
        } else {
            tracing::info!(alerts_enabled = enabled, "Alerts toggled");
            if enabled {
                "✅ Alerts enabled. You'll be notified about new stock.".to_string()
            } else {
                "⛔ Alerts disabled.".to_string()
            }
        };

        if let Err(e) = self.state.persist(self.store.as_ref()).await {
            tracing::error!(store = %self.store.describe(), "Failed to persist alert flag: {}", e);
            text.push_str("\n⚠️ The setting could not be saved and will reset on restart.");
        }

        Reply::plain(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingState;
    use crate::storage::{MemoryStore, MockStateStore};
    use crate::utils::error::StorageError;
    use rstest::rstest;

    fn surface(alerts_enabled: bool) -> (ControlSurface, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let surface = ControlSurface::new(StateHandle::new(TrackingState::new(alerts_enabled)), store.clone());
        (surface, store)
    }

    #[rstest]
    #[case("/on", Some(Command::Enable))]
    #[case("on", Some(Command::Enable))]
    #[case("/enable", Some(Command::Enable))]
    #[case("ENABLE", Some(Command::Enable))]
    #[case("/off", Some(Command::Disable))]
    #[case("disable", Some(Command::Disable))]
    #[case("/status@restock_bot", Some(Command::Status))]
    #[case("  status  ", Some(Command::Status))]
    #[case("/start", Some(Command::Menu))]
    #[case("/menu", Some(Command::Menu))]
    #[case("/help", Some(Command::Help))]
    #[case("start", None)]
    #[case("hello", None)]
    #[case("", None)]
    fn test_command_parsing(#[case] text: &str, #[case] expected: Option<Command>) {
        assert_eq!(Command::parse(text), expected);
    }

    #[test]
    fn test_callback_parsing() {
        assert_eq!(Command::from_callback("on"), Some(Command::Enable));
        assert_eq!(Command::from_callback("off"), Some(Command::Disable));
        assert_eq!(Command::from_callback("status"), Some(Command::Status));
        assert_eq!(Command::from_callback("/on"), None);
    }

    #[tokio::test]
    async fn test_enable_flips_flag_and_persists() {
        let (surface, store) = surface(false);

        let reply = surface.handle(Command::Enable).await;
        assert!(reply.text.contains("enabled"));
        assert!(surface.status().await.alerts_enabled);
        assert!(store.load().await.unwrap().unwrap().alerts_enabled());

        let again = surface.handle(Command::Enable).await;
        assert!(again.text.contains("already enabled"));
    }

    #[tokio::test]
    async fn test_disable_persists() {
        let (surface, store) = surface(true);

        surface.handle(Command::Disable).await;
        assert!(!store.load().await.unwrap().unwrap().alerts_enabled());
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported_in_reply() {
        let mut store = MockStateStore::new();
        store.expect_save().returning(|_| {
            Err(StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        });
        store.expect_describe().return_const("mock".to_string());

        let surface = ControlSurface::new(StateHandle::new(TrackingState::new(false)), Arc::new(store));
        let reply = surface.handle(Command::Enable).await;

        assert!(reply.text.contains("could not be saved"));
        assert!(surface.status().await.alerts_enabled);
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let mut state = TrackingState::new(true);
        state.mark_seen("1");
        state.mark_seen("2");
        state.mark_in_stock("2");
        let surface = ControlSurface::new(StateHandle::new(state), Arc::new(MemoryStore::new()));

        let report = surface.status().await;
        assert_eq!(report.tracked, 2);
        assert_eq!(report.in_stock, 1);
        assert!(report.last_cycle.is_none());

        let reply = surface.handle(Command::Status).await;
        assert!(reply.text.contains("Tracked products: 2"));
        assert!(reply.text.contains("In stock: 1"));
        assert!(reply.text.contains("not run yet"));
        assert!(!reply.with_menu);
    }

    #[tokio::test]
    async fn test_menu_and_help() {
        let (surface, _) = surface(false);

        let menu = surface.handle(Command::Menu).await;
        assert!(menu.with_menu);
        assert!(menu.text.contains("OFF"));

        let help = surface.handle(Command::Help).await;
        assert!(help.text.contains("/status"));
    }
}
