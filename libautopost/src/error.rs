//! Error types for Autopost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutopostError>;

#[derive(Error, Debug)]
pub enum AutopostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AutopostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AutopostError::InvalidInput(_) => 3,
            AutopostError::Config(_) => 2,
            AutopostError::Platform(PlatformError::Authentication(_)) => 2,
            AutopostError::Generation(GenerationError::MissingApiKey(_)) => 2,
            AutopostError::Platform(_) => 1,
            AutopostError::Store(_) => 1,
            AutopostError::Generation(_) => 1,
        }
    }

    /// True when the error came from the post store rather than a publisher
    pub fn is_store_error(&self) -> bool {
        matches!(self, AutopostError::Store(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl PlatformError {
    /// Whether another try of the same publisher could succeed
    ///
    /// Only configuration mistakes are final; every failure reported by a
    /// publisher is retried until the attempt budget runs out.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PlatformError::UnknownPlatform(_))
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Request failed: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}
