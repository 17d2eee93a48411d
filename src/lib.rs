/// Error types for the observer agent
pub mod error;

/// Core per-cycle data types
pub mod events;

/// Collectors for metrics and logs
pub mod collectors;

/// Threshold-based anomaly detection
pub mod detector;

/// Payload bounding for the observation batch
pub mod bounder;

/// Summarizer trait and backends
pub mod ai;

/// Message bus publishing
pub mod publisher;

/// The periodic cycle driver
pub mod observer;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{CollectorError, ConfigError, PublishError, SummaryError};
