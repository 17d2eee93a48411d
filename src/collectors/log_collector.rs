use crate::error::CollectorError;
use crate::events::{LogEntry, LogStats};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Case-insensitive line filter for significant log lines
const SEVERITY_FILTER: &str = "(?i)(error|warn|fatal|exception|panic)";

/// Log collector for per-service log stats and significant log lines
///
/// Talks to a Loki-compatible API. Two operations: a targeted fetch of raw
/// log lines matching the severity keyword filter, and aggregated
/// `count_over_time` queries producing per-service level counts.
pub struct LogCollector {
    client: Client,
    base_url: String,
}

/// Loki `query_range` response envelope
#[derive(Debug, Deserialize)]
struct LokiResponse {
    data: LokiData,
}

#[derive(Debug, Deserialize)]
struct LokiData {
    #[serde(default)]
    result: Vec<LokiStream>,
}

#[derive(Debug, Deserialize)]
struct LokiStream {
    #[serde(default)]
    stream: HashMap<String, String>,
    /// `[["timestamp_ns", "line"], ...]`, newest first with `direction=backward`
    #[serde(default)]
    values: Vec<(String, String)>,
}

/// Loki vector response for aggregated counts, same shape as Prometheus
#[derive(Debug, Deserialize)]
struct CountResponse {
    data: CountData,
}

#[derive(Debug, Deserialize)]
struct CountData {
    #[serde(default)]
    result: Vec<CountSample>,
}

#[derive(Debug, Deserialize)]
struct CountSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

impl LogCollector {
    /// Create a new LogCollector for the given Loki base URL
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Fetch raw significant log lines over the trailing window
    ///
    /// Builds a single filter query: restricted to `services_of_interest`
    /// when the list is non-empty, all services otherwise. Requests up to
    /// `limit` entries ordered newest-first and deduplicates on the
    /// composite key `(timestamp, service, message)` so overlapping stream
    /// chunks are not double-counted.
    ///
    /// # Errors
    ///
    /// Returns `CollectorError` on transport failure, non-2xx status or
    /// malformed JSON; the cycle driver treats this as a warning, not an
    /// abort.
    pub async fn collect_significant_logs(
        &self,
        lookback_minutes: u64,
        limit: usize,
        services_of_interest: &[String],
    ) -> Result<Vec<LogEntry>, CollectorError> {
        let query = format!(
            "{} |~ `{}`",
            build_selector(services_of_interest),
            SEVERITY_FILTER
        );
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(lookback_minutes as i64);

        let url = format!(
            "{}/loki/api/v1/query_range",
            self.base_url.trim_end_matches('/')
        );
        let start = nanos(start).to_string();
        let end = nanos(end).to_string();
        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("limit", limit.as_str()),
                ("direction", "backward"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::Status {
                endpoint: url,
                status: response.status(),
            });
        }

        let body = response.text().await?;
        let entries = parse_streams(&body)?;
        debug!(
            "Collected {} significant log entries over the last {}m",
            entries.len(),
            lookback_minutes
        );
        Ok(entries)
    }

    /// Aggregate per-service log-level counts over the trailing window
    ///
    /// Issues three `count_over_time` queries (critical/fatal,
    /// error/exception, warn/warning) grouped by service, fanned out
    /// concurrently. A per-query failure is logged and skipped; it is not
    /// fatal to the whole call.
    pub async fn log_stats_by_service(
        &self,
        lookback_minutes: u64,
    ) -> Result<HashMap<String, LogStats>, CollectorError> {
        let (critical, error, warning) = tokio::join!(
            self.count_by_service("(?i)(critical|fatal)", lookback_minutes),
            self.count_by_service("(?i)(error|exception)", lookback_minutes),
            self.count_by_service("(?i)(warn|warning)", lookback_minutes),
        );

        let mut stats: HashMap<String, LogStats> = HashMap::new();
        Self::merge_counts("critical", critical, &mut stats, |s, v| {
            s.critical_count = v
        });
        Self::merge_counts("error", error, &mut stats, |s, v| s.error_count = v);
        Self::merge_counts("warning", warning, &mut stats, |s, v| s.warning_count = v);

        debug!("Collected log stats for {} services", stats.len());
        Ok(stats)
    }

    /// Merge one count query into the stats map, degrading a failed query
    /// to a warning
    fn merge_counts<F>(
        level: &str,
        result: Result<Vec<(String, u64)>, CollectorError>,
        into: &mut HashMap<String, LogStats>,
        mut set: F,
    ) where
        F: FnMut(&mut LogStats, u64),
    {
        match result {
            Ok(counts) => {
                for (service, count) in counts {
                    let stats = into.entry(service).or_default();
                    set(stats, count);
                }
            }
            Err(e) => warn!("Log count query for {} failed, skipping: {}", level, e),
        }
    }

    /// Run one aggregated count query and return `(service, count)` pairs
    async fn count_by_service(
        &self,
        level_filter: &str,
        lookback_minutes: u64,
    ) -> Result<Vec<(String, u64)>, CollectorError> {
        let query = format!(
            "sum by (job) (count_over_time({{job=~\".+\"}} |~ `{}` [{}m]))",
            level_filter, lookback_minutes
        );

        let url = format!("{}/loki/api/v1/query", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("query", query.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::Status {
                endpoint: url,
                status: response.status(),
            });
        }

        let body = response.text().await?;
        parse_counts(&body)
    }
}

/// Build the LogQL stream selector for the targeted fetch
///
/// A non-empty allow-list becomes a regex alternation of the (escaped)
/// service names; an empty list matches all services.
fn build_selector(services: &[String]) -> String {
    if services.is_empty() {
        return "{job=~\".+\"}".to_string();
    }
    let alternation = services
        .iter()
        .map(|s| regex_escape(s))
        .collect::<Vec<_>>()
        .join("|");
    format!("{{job=~\"{}\"}}", alternation)
}

/// Escape regex metacharacters in a service name
fn regex_escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Nanosecond unix timestamp, as Loki expects
fn nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Parse a Loki streams response into deduplicated log entries
///
/// Streams are flattened in the order Loki returns them (newest first per
/// stream); duplicates on `(timestamp, service, message)` collapse to the
/// first occurrence. An entry with an unparsable timestamp is skipped.
fn parse_streams(body: &str) -> Result<Vec<LogEntry>, CollectorError> {
    let response: LokiResponse =
        serde_json::from_str(body).map_err(|e| CollectorError::Parse(e.to_string()))?;

    let mut seen: HashSet<(i64, String, String)> = HashSet::new();
    let mut entries = Vec::new();

    for stream in response.data.result {
        let service = stream
            .stream
            .get("job")
            .or_else(|| stream.stream.get("service"))
            .cloned()
            .unwrap_or_default();
        let level = stream
            .stream
            .get("level")
            .or_else(|| stream.stream.get("detected_level"))
            .cloned()
            .unwrap_or_default();

        for (ts, line) in stream.values {
            let ts_nanos: i64 = match ts.parse() {
                Ok(ns) => ns,
                Err(_) => {
                    debug!("Skipping log entry with unparsable timestamp '{}'", ts);
                    continue;
                }
            };
            if !seen.insert((ts_nanos, service.clone(), line.clone())) {
                continue;
            }
            entries.push(LogEntry {
                timestamp: DateTime::from_timestamp_nanos(ts_nanos),
                message: line,
                service: service.clone(),
                level: level.clone(),
            });
        }
    }

    Ok(entries)
}

/// Parse a Loki vector response into `(service, count)` pairs
///
/// Non-numeric values and samples without a `job` label are skipped
/// individually, mirroring the metrics collector.
fn parse_counts(body: &str) -> Result<Vec<(String, u64)>, CollectorError> {
    let response: CountResponse =
        serde_json::from_str(body).map_err(|e| CollectorError::Parse(e.to_string()))?;

    let mut counts = Vec::with_capacity(response.data.result.len());
    for sample in response.data.result {
        let service = match sample.metric.get("job") {
            Some(job) if !job.is_empty() => job.clone(),
            _ => {
                debug!("Skipping count sample without job label");
                continue;
            }
        };
        match sample.value.1.parse::<f64>() {
            Ok(value) => counts.push((service, value as u64)),
            Err(_) => debug!(
                "Skipping non-numeric count '{}' for service {}",
                sample.value.1, service
            ),
        }
    }
    Ok(counts)
}
