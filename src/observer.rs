//! The cycle driver: a periodic control loop over the collect, detect,
//! bound, summarize, publish stages
//!
//! One cycle runs to completion before the next begins; a long cycle
//! delays the next tick instead of stacking it. Every stage failure is
//! isolated: the cycle always proceeds to publish something, so the
//! downstream queue receives a steady heartbeat of exactly one message
//! per tick even during partial backend outages.

use crate::ai::Summarizer;
use crate::bounder;
use crate::collectors::{LogCollector, MetricsCollector};
use crate::config::Config;
use crate::detector::AnomalyDetector;
use crate::events::ObservationBatch;
use crate::publisher::{Publisher, HEALTH_SUMMARY_ROUTING_KEY};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Stages of one observation cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStage {
    CollectingMetrics,
    CollectingLogStats,
    DetectingAnomalies,
    CollectingTargetedLogs,
    Bounding,
    Summarizing,
    Publishing,
}

/// The polling Observer agent
///
/// Owns the collectors, the detector and the collaborator handles for the
/// summarizer and the message bus. Configuration is read-only after
/// startup; no other state crosses cycle boundaries.
pub struct Observer {
    config: Config,
    metrics_collector: MetricsCollector,
    log_collector: LogCollector,
    detector: AnomalyDetector,
    /// `None` when no credential is configured: degraded mode, placeholder
    /// summaries only
    summarizer: Option<Arc<dyn Summarizer>>,
    publisher: Arc<dyn Publisher>,
}

impl Observer {
    /// Assemble the observer from configuration and collaborator handles
    pub fn new(
        config: Config,
        summarizer: Option<Arc<dyn Summarizer>>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let metrics_collector = MetricsCollector::new(config.prometheus.url.clone());
        let log_collector = LogCollector::new(config.loki.url.clone());
        let detector = AnomalyDetector::new(
            config.thresholds.clone(),
            &config.observer.excluded_services,
        );

        Self {
            config,
            metrics_collector,
            log_collector,
            detector,
            summarizer,
            publisher,
        }
    }

    /// Run the observation loop until the shutdown signal fires
    ///
    /// The timer is non-reentrant: a cycle that outlives the interval
    /// delays the next tick rather than overlapping it. On shutdown an
    /// in-flight cycle is abandoned; its publish either fully succeeded
    /// already or never happens.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.observer.cycle_interval_seconds);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Observer loop started, cycle interval {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = shutdown.changed() => {
                            info!("Shutdown requested, abandoning in-flight cycle");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!("Observer loop stopped");
    }

    /// Execute one full observation cycle
    ///
    /// Each collection failure degrades to an empty result; exactly one
    /// publish is attempted per call, and a publish failure only logs.
    pub async fn run_cycle(&self) {
        let window = self.config.observer.log_window_minutes;

        self.enter(CycleStage::CollectingMetrics);
        let metrics = match self.metrics_collector.collect_key_metrics().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Metrics collection failed, continuing with empty set: {}", e);
                HashMap::new()
            }
        };

        self.enter(CycleStage::CollectingLogStats);
        let log_stats = match self.log_collector.log_stats_by_service(window).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Log stats collection failed, continuing with empty set: {}", e);
                HashMap::new()
            }
        };

        self.enter(CycleStage::DetectingAnomalies);
        let flagged = self.detector.detect(&metrics, &log_stats);
        let mut anomalous: Vec<String> = flagged.keys().cloned().collect();
        anomalous.sort();
        if flagged.is_empty() {
            debug!("No anomalous services this cycle");
        } else {
            for service in &anomalous {
                info!("Anomalous service {}: {:?}", service, flagged[service]);
            }
        }

        self.enter(CycleStage::CollectingTargetedLogs);
        let logs = match self
            .log_collector
            .collect_significant_logs(window, self.config.limits.max_logs, &anomalous)
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                warn!("Targeted log fetch failed, continuing without logs: {}", e);
                Vec::new()
            }
        };

        self.enter(CycleStage::Bounding);
        let batch = ObservationBatch {
            cluster: self.config.cluster.clone(),
            timestamp: Utc::now(),
            aggregate_metrics: metrics,
            significant_logs: logs,
        };
        let bounded = bounder::bound(
            batch,
            self.config.limits.max_logs,
            self.config.limits.max_log_length,
        );

        self.enter(CycleStage::Summarizing);
        let summary = self.summarize(&bounded).await;

        self.enter(CycleStage::Publishing);
        if let Err(e) = self
            .publisher
            .publish(HEALTH_SUMMARY_ROUTING_KEY, summary.as_bytes())
            .await
        {
            error!("Failed to publish cycle summary, dropping it: {}", e);
        }
    }

    /// Produce the summary text for the bounded batch
    ///
    /// Falls back to the canned placeholder when no summarizer is
    /// configured, the batch carries no signal, or the summarizer call
    /// fails. The cycle always has something to publish.
    async fn summarize(&self, bounded: &ObservationBatch) -> String {
        let summarizer = match &self.summarizer {
            Some(summarizer) if !bounded.is_empty() => summarizer,
            Some(_) => {
                debug!("Batch is empty, publishing placeholder summary");
                return placeholder_summary(bounded);
            }
            None => {
                debug!("No summarizer configured, publishing placeholder summary");
                return placeholder_summary(bounded);
            }
        };

        match summarizer.summarize(bounded).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarization failed, publishing placeholder: {}", e);
                placeholder_summary(bounded)
            }
        }
    }

    fn enter(&self, stage: CycleStage) {
        debug!("Cycle stage: {:?}", stage);
    }
}

/// Canned summary published when real summarization is unavailable
pub fn placeholder_summary(batch: &ObservationBatch) -> String {
    serde_json::json!({
        "cluster": batch.cluster,
        "timestamp": batch.timestamp.to_rfc3339(),
        "summary": "No summary available for this cycle",
        "services_observed": batch.aggregate_metrics.len(),
        "significant_logs": batch.significant_logs.len(),
    })
    .to_string()
}
