//! Error types for vip-onboard.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Activity API error: {0}")]
    ActivityApi(#[from] ActivityApiError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat transport errors (inbound fetch and outbound send).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to fetch updates: {0}")]
    FetchFailed(String),

    #[error("Failed to send to chat {chat_id}: {reason}")]
    SendFailed { chat_id: i64, reason: String },

    #[error("Channel health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Invalid update payload: {0}")]
    InvalidUpdate(String),
}

/// External account-activity API errors. Any of these aborts the whole
/// paginated fetch; pages are never skipped silently.
#[derive(Debug, thiserror::Error)]
pub enum ActivityApiError {
    #[error("Request for page {page} failed: {reason}")]
    RequestFailed { page: u32, reason: String },

    #[error("Failed to decode page {page}: {reason}")]
    DecodeFailed { page: u32, reason: String },

    #[error("Provider rejected page {page}: code {code}")]
    ProviderError { page: u32, code: i64 },
}

/// A user-input validation failure. Ordinary return value, not a fault:
/// it never mutates session state and its message is sent back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
