/// Summarizer trait and the OpenAI-compatible backend
pub mod summarizer;

pub use summarizer::{OpenAiSummarizer, Summarizer};

#[cfg(test)]
pub use summarizer::MockSummarizer;
