pub mod notifier;

pub use notifier::{NotificationMessage, NotificationResult, NotifierPlugin};
