pub mod config;
pub mod control;
pub mod detector;
pub mod feed;
pub mod models;
pub mod normalizer;
pub mod plugins;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::AppConfig;
pub use detector::ChangeDetector;
pub use utils::error::AppError;
pub use watcher::{CycleReport, InventoryWatcher, StateHandle};

pub type Result<T> = std::result::Result<T, AppError>;
