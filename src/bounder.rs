//! Payload bounding for the observation batch
//!
//! Guarantees a bounded-size downstream request regardless of upstream
//! volume: the output size is a deterministic function of the two
//! configured maxima only.

use crate::events::ObservationBatch;

/// Marker appended to a message cut at the length limit
const TRUNCATION_MARKER: &str = "...";

/// Bound the batch before it is handed to the summarizer
///
/// Copies cluster, timestamp and metrics unchanged (metrics are already
/// small and keyed, not sequence-shaped). Keeps the first
/// `min(len, max_logs)` log entries in their existing order, which is
/// most-recent-first since the collectors return newest-first, and
/// truncates each message to `max_log_length` characters with a trailing
/// marker when it was longer.
pub fn bound(batch: ObservationBatch, max_logs: usize, max_log_length: usize) -> ObservationBatch {
    let significant_logs = batch
        .significant_logs
        .into_iter()
        .take(max_logs)
        .map(|mut entry| {
            entry.message = truncate_message(entry.message, max_log_length);
            entry
        })
        .collect();

    ObservationBatch {
        significant_logs,
        ..batch
    }
}

/// Cut a message at `max_chars` characters, appending the marker if cut
fn truncate_message(message: String, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message;
    }
    let mut truncated: String = message.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogEntry, MetricSnapshot};
    use chrono::Utc;

    fn batch_with_logs(messages: &[&str]) -> ObservationBatch {
        let mut batch = ObservationBatch::empty("test");
        for (i, message) in messages.iter().enumerate() {
            batch.significant_logs.push(LogEntry {
                timestamp: Utc::now() - chrono::Duration::seconds(i as i64),
                message: message.to_string(),
                service: "svc".to_string(),
                level: "error".to_string(),
            });
        }
        batch
    }

    #[test]
    fn test_bound_keeps_first_entries_in_order() {
        let batch = batch_with_logs(&["one", "two", "three", "four", "five"]);

        let bounded = bound(batch, 2, 100);
        assert_eq!(bounded.significant_logs.len(), 2);
        assert_eq!(bounded.significant_logs[0].message, "one");
        assert_eq!(bounded.significant_logs[1].message, "two");
    }

    #[test]
    fn test_bound_truncates_long_messages_with_marker() {
        let batch = batch_with_logs(&["abcdefghij"]);

        let bounded = bound(batch, 10, 4);
        assert_eq!(bounded.significant_logs[0].message, "abcd...");
    }

    #[test]
    fn test_bound_leaves_short_messages_untouched() {
        let batch = batch_with_logs(&["short"]);

        let bounded = bound(batch, 10, 5);
        assert_eq!(bounded.significant_logs[0].message, "short");
    }

    #[test]
    fn test_bound_is_identity_on_empty_batch() {
        let batch = ObservationBatch::empty("test");
        let before = batch.clone();

        let bounded = bound(batch, 10, 100);
        assert_eq!(bounded, before);
    }

    #[test]
    fn test_bound_never_touches_metrics() {
        let mut batch = batch_with_logs(&["a very long message that will be cut"]);
        batch.aggregate_metrics.insert(
            "svc".to_string(),
            MetricSnapshot {
                error_rate_percent: 42.0,
                ..MetricSnapshot::default()
            },
        );
        let metrics_before = batch.aggregate_metrics.clone();

        let bounded = bound(batch, 1, 5);
        assert_eq!(bounded.aggregate_metrics, metrics_before);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        // Multibyte characters must not be split
        let truncated = truncate_message("héllo wörld".to_string(), 6);
        assert_eq!(truncated, "héllo ...");
    }
}
