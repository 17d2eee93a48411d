use crate::error::SummaryError;
use crate::events::ObservationBatch;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed instruction prompt sent with every observation batch
const INSTRUCTION_PROMPT: &str = "You are the observer of an incident-response system. \
Analyze the attached cluster observation and produce a JSON health summary. \
Group similar issues together. Report at most 3 issues per service and at most \
2 log excerpts per issue. Give a single most-likely hypothesis per issue.";

/// Trait for summarization backends
///
/// The cycle driver invokes this once per cycle with the bounded batch;
/// tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a bounded observation batch into a health summary
    async fn summarize(&self, batch: &ObservationBatch) -> Result<String, SummaryError>;
}

/// Summarizer backed by an OpenAI-compatible chat-completions API
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

/// Request format for the chat-completions API
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response format from the chat-completions API
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

impl OpenAiSummarizer {
    /// Create a new summarizer
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key for the endpoint
    /// * `model` - Model name to use (e.g. "gpt-4o-mini")
    /// * `base_url` - OpenAI-compatible endpoint base URL
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url,
        }
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, batch: &ObservationBatch) -> Result<String, SummaryError> {
        let observation = serde_json::to_string_pretty(batch)
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: INSTRUCTION_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: observation,
                },
            ],
            // Low temperature for consistent summaries
            temperature: 0.1,
        };

        debug!(
            "Summarizing batch: {} services, {} log entries",
            batch.aggregate_metrics.len(),
            batch.significant_logs.len()
        );

        let response = self
            .client
            .post(self.api_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SummaryError::Backend(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        if let Some(error) = chat_response.error {
            return Err(SummaryError::Backend(error.message));
        }

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SummaryError::InvalidResponse("response has no choices".to_string()))?;

        Ok(extract_json_span(&content))
    }
}

/// Extract the first `{...}` JSON span from free-form model output
///
/// Models sometimes wrap the JSON in prose or markdown fences; text before
/// the first `{` and after the last `}` is discarded. A reply without
/// braces is passed through trimmed.
fn extract_json_span(text: &str) -> String {
    let text = text.trim();
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_span_plain_json() {
        let text = r#"{"status": "degraded"}"#;
        assert_eq!(extract_json_span(text), text);
    }

    #[test]
    fn test_extract_json_span_strips_surrounding_prose() {
        let text = "Here is the summary:\n{\"status\": \"ok\"}\nLet me know!";
        assert_eq!(extract_json_span(text), "{\"status\": \"ok\"}");
    }

    #[test]
    fn test_extract_json_span_strips_markdown_fences() {
        let text = "```json\n{\"issues\": []}\n```";
        assert_eq!(extract_json_span(text), "{\"issues\": []}");
    }

    #[test]
    fn test_extract_json_span_keeps_nested_braces() {
        let text = "prefix {\"a\": {\"b\": 1}} suffix";
        assert_eq!(extract_json_span(text), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_extract_json_span_no_braces_passes_through() {
        assert_eq!(extract_json_span("  all healthy  "), "all healthy");
    }

    #[test]
    fn test_extract_json_span_reversed_braces() {
        // '}' before '{': no valid span, trimmed passthrough
        assert_eq!(extract_json_span("} not json {"), "} not json {");
    }

    #[test]
    fn test_chat_response_parses_error_payload() {
        let body = r#"{"error": {"message": "invalid api key"}}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(response.choices.is_empty());
        assert_eq!(response.error.unwrap().message, "invalid api key");
    }

    #[test]
    fn test_chat_response_parses_content() {
        let body = r#"{"choices": [{"message": {"content": "{\"ok\": true}"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "{\"ok\": true}");
    }
}
