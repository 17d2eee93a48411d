//! Anomaly detection over per-cycle metric and log snapshots
//!
//! The detector is a pure function of its two inputs: given the same
//! metrics and log stats it always produces the same flagged set and
//! reason assignment.

use crate::config::ThresholdConfig;
use crate::events::{AnomalyReason, LogStats, MetricSnapshot};
use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Infrastructure services the detector never flags
///
/// Flagging the metrics/log backends themselves would make the observer
/// chase its own tail during a backend outage.
pub const DEFAULT_EXCLUDED_SERVICES: &[&str] = &[
    "prometheus",
    "loki",
    "promtail",
    "grafana",
    "alertmanager",
    "node-exporter",
    "cadvisor",
];

/// Threshold-based anomaly detector
///
/// Combines metric snapshots and log-count snapshots into a set of
/// anomalous service names using independent threshold rules with
/// short-circuit priority: the metric-threshold rule wins over the
/// log-severity rule, so each service is flagged at most once with a
/// single reason.
pub struct AnomalyDetector {
    thresholds: ThresholdConfig,
    excluded: HashSet<String>,
}

impl AnomalyDetector {
    /// Create a detector with the given thresholds and exclusion list
    pub fn new(thresholds: ThresholdConfig, excluded_services: &[String]) -> Self {
        Self {
            thresholds,
            excluded: excluded_services.iter().cloned().collect(),
        }
    }

    /// Flag anomalous services, with the triggering reason per service
    ///
    /// Evaluates every service in the union of the two input key sets,
    /// minus the exclusion list. The returned reason codes are diagnostic
    /// only; the functional contract is the key set.
    pub fn detect(
        &self,
        metrics: &HashMap<String, MetricSnapshot>,
        log_stats: &HashMap<String, LogStats>,
    ) -> HashMap<String, AnomalyReason> {
        // BTreeSet for a deterministic evaluation (and logging) order
        let services: BTreeSet<&String> = metrics.keys().chain(log_stats.keys()).collect();

        let mut flagged = HashMap::new();
        for service in services {
            if self.excluded.contains(service.as_str()) {
                continue;
            }

            if let Some(snapshot) = metrics.get(service) {
                if self.metrics_anomalous(snapshot) {
                    debug!(
                        "Flagging {}: error_rate={:.2}% p95={:.3}s cpu={:.2} cores",
                        service,
                        snapshot.error_rate_percent,
                        snapshot.latency_p95_seconds,
                        snapshot.cpu_usage_cores
                    );
                    flagged.insert(service.clone(), AnomalyReason::MetricThreshold);
                    continue;
                }
            }

            if let Some(stats) = log_stats.get(service) {
                if self.logs_anomalous(stats) {
                    debug!(
                        "Flagging {}: critical={} error={} warning={}",
                        service, stats.critical_count, stats.error_count, stats.warning_count
                    );
                    flagged.insert(service.clone(), AnomalyReason::LogSeverity);
                }
            }
        }

        flagged
    }

    /// Rule 2: any metric signal past its cutoff flags the service
    fn metrics_anomalous(&self, snapshot: &MetricSnapshot) -> bool {
        snapshot.error_rate_percent > self.thresholds.error_rate_percent
            || snapshot.latency_p95_seconds > self.thresholds.latency_p95_seconds
            || snapshot.cpu_usage_cores * 100.0 > self.thresholds.cpu_percent
    }

    /// Rule 3: severity counts checked in order, most severe first
    fn logs_anomalous(&self, stats: &LogStats) -> bool {
        if stats.critical_count >= self.thresholds.critical_logs {
            return true;
        }
        if stats.error_count >= self.thresholds.error_logs {
            return true;
        }
        stats.warning_count >= self.thresholds.warning_logs
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    #[derive(Debug, Clone)]
    struct ArbitrarySnapshot(MetricSnapshot);

    impl Arbitrary for ArbitrarySnapshot {
        fn arbitrary(g: &mut Gen) -> Self {
            // Keep values in a realistic, finite range
            ArbitrarySnapshot(MetricSnapshot {
                error_rate_percent: (u16::arbitrary(g) % 10_000) as f64 / 100.0,
                latency_p95_seconds: (u16::arbitrary(g) % 6_000) as f64 / 100.0,
                traffic_requests_per_sec: (u16::arbitrary(g) % 10_000) as f64,
                cpu_usage_cores: (u16::arbitrary(g) % 3_200) as f64 / 100.0,
            })
        }
    }

    #[derive(Debug, Clone)]
    struct ArbitraryStats(LogStats);

    impl Arbitrary for ArbitraryStats {
        fn arbitrary(g: &mut Gen) -> Self {
            ArbitraryStats(LogStats {
                critical_count: u64::from(u8::arbitrary(g)),
                error_count: u64::from(u8::arbitrary(g)),
                warning_count: u64::from(u8::arbitrary(g)),
            })
        }
    }

    fn build_inputs(
        metrics: Vec<(String, ArbitrarySnapshot)>,
        log_stats: Vec<(String, ArbitraryStats)>,
    ) -> (
        HashMap<String, MetricSnapshot>,
        HashMap<String, LogStats>,
    ) {
        let metrics = metrics.into_iter().map(|(k, v)| (k, v.0)).collect();
        let log_stats = log_stats.into_iter().map(|(k, v)| (k, v.0)).collect();
        (metrics, log_stats)
    }

    #[quickcheck]
    fn prop_detection_is_deterministic(
        metrics: Vec<(String, ArbitrarySnapshot)>,
        log_stats: Vec<(String, ArbitraryStats)>,
    ) -> bool {
        let (metrics, log_stats) = build_inputs(metrics, log_stats);
        let detector = AnomalyDetector::new(ThresholdConfig::default(), &[]);

        detector.detect(&metrics, &log_stats) == detector.detect(&metrics, &log_stats)
    }

    #[quickcheck]
    fn prop_flagged_set_is_subset_of_input_union(
        metrics: Vec<(String, ArbitrarySnapshot)>,
        log_stats: Vec<(String, ArbitraryStats)>,
    ) -> bool {
        let (metrics, log_stats) = build_inputs(metrics, log_stats);
        let detector = AnomalyDetector::new(ThresholdConfig::default(), &[]);

        detector
            .detect(&metrics, &log_stats)
            .keys()
            .all(|s| metrics.contains_key(s) || log_stats.contains_key(s))
    }

    #[quickcheck]
    fn prop_excluded_services_never_flagged(
        metrics: Vec<(String, ArbitrarySnapshot)>,
        log_stats: Vec<(String, ArbitraryStats)>,
        excluded: Vec<String>,
    ) -> bool {
        let (metrics, log_stats) = build_inputs(metrics, log_stats);
        let detector = AnomalyDetector::new(ThresholdConfig::default(), &excluded);

        let flagged = detector.detect(&metrics, &log_stats);
        excluded.iter().all(|s| !flagged.contains_key(s))
    }

    #[quickcheck]
    fn prop_metric_rule_shadows_log_rule(service: String, stats: ArbitraryStats) -> bool {
        // A service whose metrics trip rule 2 must never carry the
        // LogSeverity reason, whatever its log counts are.
        let detector = AnomalyDetector::new(ThresholdConfig::default(), &[]);

        let mut metrics = HashMap::new();
        metrics.insert(
            service.clone(),
            MetricSnapshot {
                error_rate_percent: 100.0,
                ..MetricSnapshot::default()
            },
        );
        let mut log_stats = HashMap::new();
        log_stats.insert(service.clone(), stats.0);

        detector.detect(&metrics, &log_stats).get(&service)
            == Some(&AnomalyReason::MetricThreshold)
    }
}
