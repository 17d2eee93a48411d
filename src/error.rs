use thiserror::Error;

/// Errors that can occur in the metrics and log collectors
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Errors that can occur when summarizing an observation batch
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Summarizer backend error: {0}")]
    Backend(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur when publishing to the message bus
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Failed to serialize message body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that can occur during configuration loading
///
/// Any of these is fatal at startup: the process refuses to run a single
/// cycle with a broken configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Invalid environment override for {key}: {value}")]
    EnvError { key: String, value: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
