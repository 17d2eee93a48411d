//! Core data types for the Observer agent
//!
//! This module defines the per-cycle snapshot structures produced by the
//! collectors and consumed by the anomaly detector and summarizer. All of
//! them are ephemeral: rebuilt from scratch every cycle, never aliased
//! across cycle boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Aggregate metric signals for a single service over the trailing window
///
/// Every field defaults to zero; a service absent from one of the four
/// metric queries keeps the zero default for that field rather than being
/// dropped from the map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    /// Percentage of requests answered with a 5xx status
    pub error_rate_percent: f64,
    /// 95th percentile request latency in seconds
    pub latency_p95_seconds: f64,
    /// Request throughput in requests per second
    pub traffic_requests_per_sec: f64,
    /// CPU consumption in cores
    pub cpu_usage_cores: f64,
}

/// Per-service log-level counts over the trailing window
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogStats {
    /// Lines matching critical/fatal keywords
    pub critical_count: u64,
    /// Lines matching error/exception keywords
    pub error_count: u64,
    /// Lines matching warn/warning keywords
    pub warning_count: u64,
}

/// A single significant log line matched by the severity keyword filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// When the line was emitted
    pub timestamp: Timestamp,
    /// The log line content
    pub message: String,
    /// Service that emitted the line (the `job` label)
    pub service: String,
    /// Detected level label, empty when the stream carries none
    pub level: String,
}

/// The unit of data produced per cycle and handed to the summarizer
///
/// Owned exclusively by the current cycle and never mutated after being
/// handed off to the summarizer or publisher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationBatch {
    /// Cluster tag stamped into every batch
    pub cluster: String,
    /// When the batch was assembled
    pub timestamp: Timestamp,
    /// Union of services seen in any metric query this cycle
    pub aggregate_metrics: HashMap<String, MetricSnapshot>,
    /// Significant log lines, newest first
    pub significant_logs: Vec<LogEntry>,
}

impl ObservationBatch {
    /// Create an empty batch for the given cluster, stamped now
    pub fn empty(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            timestamp: Utc::now(),
            aggregate_metrics: HashMap::new(),
            significant_logs: Vec::new(),
        }
    }

    /// A batch with neither metrics nor logs carries no signal worth
    /// summarizing; the cycle driver publishes a placeholder instead.
    pub fn is_empty(&self) -> bool {
        self.aggregate_metrics.is_empty() && self.significant_logs.is_empty()
    }
}

/// Diagnostic reason code explaining why a service was flagged
///
/// Emitted for observability only; the functional contract of the detector
/// is the flagged set itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnomalyReason {
    /// Flagged by the metric-threshold rule
    MetricThreshold,
    /// Flagged by the log-severity rule
    LogSeverity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_snapshot_defaults_to_zero() {
        let snapshot = MetricSnapshot::default();
        assert_eq!(snapshot.error_rate_percent, 0.0);
        assert_eq!(snapshot.latency_p95_seconds, 0.0);
        assert_eq!(snapshot.traffic_requests_per_sec, 0.0);
        assert_eq!(snapshot.cpu_usage_cores, 0.0);
    }

    #[test]
    fn test_log_entry_serialization_round_trip() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: "connection refused".to_string(),
            service: "checkout".to_string(),
            level: "error".to_string(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }

    #[test]
    fn test_observation_batch_empty() {
        let batch = ObservationBatch::empty("local");
        assert_eq!(batch.cluster, "local");
        assert!(batch.is_empty());

        let mut with_metrics = ObservationBatch::empty("local");
        with_metrics
            .aggregate_metrics
            .insert("checkout".to_string(), MetricSnapshot::default());
        assert!(!with_metrics.is_empty());

        let mut with_logs = ObservationBatch::empty("local");
        with_logs.significant_logs.push(LogEntry {
            timestamp: Utc::now(),
            message: "boom".to_string(),
            service: "checkout".to_string(),
            level: "error".to_string(),
        });
        assert!(!with_logs.is_empty());
    }

    #[test]
    fn test_observation_batch_serializes_logs_in_order() {
        let mut batch = ObservationBatch::empty("prod");
        for i in 0..3 {
            batch.significant_logs.push(LogEntry {
                timestamp: Utc::now(),
                message: format!("line {}", i),
                service: "api".to_string(),
                level: "warn".to_string(),
            });
        }

        let json = serde_json::to_string(&batch).unwrap();
        let deserialized: ObservationBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(batch.significant_logs, deserialized.significant_logs);
    }
}
