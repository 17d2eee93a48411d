/// Metrics collector for per-service aggregate signals
pub mod metrics_collector;

/// Log collector for per-service log stats and significant log lines
pub mod log_collector;

pub use log_collector::LogCollector;
pub use metrics_collector::MetricsCollector;
