//! Document summarization via a text LLM

use std::sync::Arc;

use crate::error::{Result, VellumError};
use crate::llm::{TextLlm, TextRequest};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a documentation assistant. Summarize the \
document you are given in a single dense paragraph that captures its topic, scope, and \
the questions it can answer. Do not add commentary or headings.";

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Summarizer wrapping a text model
pub struct Summarizer {
    llm: Arc<dyn TextLlm>,
    max_tokens: u32,
    temperature: f32,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn TextLlm>) -> Self {
        Self {
            llm,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Generate a summary for the given document text
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VellumError::InvalidInput(
                "text to summarize must be non-empty".to_string(),
            ));
        }

        let request = TextRequest::prompt(format!("Summarize the following document:\n\n{}", text))
            .with_system_prompt(SUMMARY_SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let summary = self.llm.call(request).await?;
        Ok(summary.trim().to_string())
    }
}
