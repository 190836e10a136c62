use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Plugin error: {plugin_type}: {message}")]
    Plugin { plugin_type: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which stage of a page request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Http,
    Timeout,
    Decode,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FetchErrorKind::Http => "http",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Decode => "decode",
        };
        f.write_str(label)
    }
}

/// A failed catalog page. Always recoverable: the page is skipped and
/// retried on the next cycle.
#[derive(Error, Debug, Clone)]
#[error("Fetch of page {page} failed ({kind}): {cause}")]
pub struct FetchError {
    pub page: u32,
    pub kind: FetchErrorKind,
    pub cause: String,
}

impl FetchError {
    pub fn new(page: u32, kind: FetchErrorKind, cause: impl Into<String>) -> Self {
        Self {
            page,
            kind,
            cause: cause.into(),
        }
    }

    pub fn from_reqwest(page: u32, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_decode() {
            FetchErrorKind::Decode
        } else {
            FetchErrorKind::Http
        };
        Self::new(page, kind, err.to_string())
    }
}

/// Why a raw feed record was dropped before detection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    #[error("record has no product identifier")]
    MissingId,

    #[error("record is not a JSON object")]
    NotAnObject,
}

impl SkipReason {
    /// Stable label for metrics and counters.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingId => "missing_id",
            SkipReason::NotAnObject => "not_an_object",
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Notifier misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("State file IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State database failed: {0}")]
    Database(#[from] sqlx::Error),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
