use crate::error::CollectorError;
use crate::events::MetricSnapshot;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Trailing window used by all four aggregate queries
const RANGE: &str = "5m";

/// Metrics collector for per-service aggregate signals
///
/// Issues four independent instant queries against a Prometheus-compatible
/// API (error rate, p95 latency, request rate, CPU cores), all labeled by
/// `job`, and merges the results into one map keyed by service name. The
/// map is rebuilt from scratch every cycle; no history is retained.
pub struct MetricsCollector {
    client: Client,
    base_url: String,
}

/// Prometheus instant-query response envelope
#[derive(Debug, Deserialize)]
struct PromResponse {
    data: PromData,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromSample>,
}

#[derive(Debug, Deserialize)]
struct PromSample {
    #[serde(default)]
    metric: PromLabels,
    /// `[unix_ts, "string value"]`
    value: (f64, String),
}

#[derive(Debug, Default, Deserialize)]
struct PromLabels {
    #[serde(default)]
    job: String,
}

impl MetricsCollector {
    /// Create a new MetricsCollector for the given Prometheus base URL
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Collect the key per-service metrics for the current cycle
    ///
    /// The four queries run concurrently. A failure in one query is logged
    /// as a warning and that query's contribution is simply absent from the
    /// merge; the other three proceed. Services absent from a given query
    /// keep the zero default for that field.
    ///
    /// # Errors
    ///
    /// Never fails as a whole: per-query errors are degraded to warnings.
    /// The signature keeps `Result` so callers treat the collector like its
    /// siblings; the current implementation always returns `Ok`.
    pub async fn collect_key_metrics(
        &self,
    ) -> Result<HashMap<String, MetricSnapshot>, CollectorError> {
        let error_rate = format!(
            "sum by (job) (rate(http_requests_total{{code=~\"5..\"}}[{range}])) \
             / sum by (job) (rate(http_requests_total[{range}])) * 100",
            range = RANGE
        );
        let latency_p95 = format!(
            "histogram_quantile(0.95, \
             sum by (job, le) (rate(http_request_duration_seconds_bucket[{range}])))",
            range = RANGE
        );
        let traffic = format!("sum by (job) (rate(http_requests_total[{range}]))", range = RANGE);
        let cpu = format!(
            "sum by (job) (rate(container_cpu_usage_seconds_total[{range}]))",
            range = RANGE
        );

        let (error_rate, latency_p95, traffic, cpu) = tokio::join!(
            self.query(&error_rate),
            self.query(&latency_p95),
            self.query(&traffic),
            self.query(&cpu),
        );

        let mut metrics = HashMap::new();
        Self::merge_result("error rate", error_rate, &mut metrics, |s, v| {
            s.error_rate_percent = v
        });
        Self::merge_result("p95 latency", latency_p95, &mut metrics, |s, v| {
            s.latency_p95_seconds = v
        });
        Self::merge_result("request rate", traffic, &mut metrics, |s, v| {
            s.traffic_requests_per_sec = v
        });
        Self::merge_result("cpu usage", cpu, &mut metrics, |s, v| s.cpu_usage_cores = v);

        debug!("Collected metrics for {} services", metrics.len());
        Ok(metrics)
    }

    /// Merge one query result into the snapshot map, degrading a failed
    /// query to a warning
    fn merge_result<F>(
        what: &str,
        result: Result<Vec<(String, f64)>, CollectorError>,
        into: &mut HashMap<String, MetricSnapshot>,
        set: F,
    ) where
        F: FnMut(&mut MetricSnapshot, f64),
    {
        match result {
            Ok(samples) => merge_samples(samples, into, set),
            Err(e) => warn!("Metrics query for {} failed, skipping: {}", what, e),
        }
    }

    /// Run one instant query and return `(service, value)` pairs
    async fn query(&self, expr: &str) -> Result<Vec<(String, f64)>, CollectorError> {
        let url = format!("{}/api/v1/query", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("query", expr)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::Status {
                endpoint: url,
                status: response.status(),
            });
        }

        let body = response.text().await?;
        parse_vector(&body)
    }
}

/// Parse a Prometheus vector response into `(service, value)` pairs
///
/// Samples with an empty `job` label or a non-numeric value are skipped
/// individually; they do not fail the query.
fn parse_vector(body: &str) -> Result<Vec<(String, f64)>, CollectorError> {
    let response: PromResponse =
        serde_json::from_str(body).map_err(|e| CollectorError::Parse(e.to_string()))?;

    let mut samples = Vec::with_capacity(response.data.result.len());
    for sample in response.data.result {
        if sample.metric.job.is_empty() {
            debug!("Skipping sample without job label");
            continue;
        }
        match sample.value.1.parse::<f64>() {
            Ok(value) => samples.push((sample.metric.job, value)),
            Err(_) => debug!(
                "Skipping non-numeric value '{}' for service {}",
                sample.value.1, sample.metric.job
            ),
        }
    }
    Ok(samples)
}

/// Fold one query's samples into the snapshot map
///
/// A pure reducer: inserts a zero-default snapshot for unseen services and
/// applies the field setter for each `(service, value)` pair. Kept separate
/// from the network calls so the merge itself is unit-testable.
pub(crate) fn merge_samples<F>(
    samples: Vec<(String, f64)>,
    into: &mut HashMap<String, MetricSnapshot>,
    mut set: F,
) where
    F: FnMut(&mut MetricSnapshot, f64),
{
    for (service, value) in samples {
        let snapshot = into.entry(service).or_default();
        set(snapshot, value);
    }
}
