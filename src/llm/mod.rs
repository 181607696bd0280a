//! Text and vision LLM providers
//!
//! Chat-style collaborators used by the ingestion pipeline (summaries,
//! image descriptions) and the search strategies (document selection,
//! metadata extraction).

mod describe;
mod openai;
mod summarize;

pub use describe::ImageDescriber;
pub use openai::{OpenAiTextLlm, OpenAiVisionLlm};
pub use summarize::Summarizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a text LLM call: either a prompt (with optional system
/// prompt) or an explicit message list.
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub system_prompt: Option<String>,
    pub prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl TextRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Resolve to the final message list, validating the prompt contract
    pub fn into_messages(self) -> Result<Vec<ChatMessage>> {
        if self.messages.is_empty()
            && self
                .prompt
                .as_deref()
                .map(|p| p.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(VellumError::InvalidInput(
                "either 'prompt' or 'messages' must be provided and non-empty".to_string(),
            ));
        }

        let mut messages = Vec::new();
        if let Some(system_prompt) = self.system_prompt {
            messages.push(ChatMessage::system(system_prompt));
        }
        if self.messages.is_empty() {
            messages.push(ChatMessage::user(self.prompt.unwrap_or_default()));
        } else {
            messages.extend(self.messages);
        }
        Ok(messages)
    }
}

/// Request for a vision LLM call
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    /// Base64 payloads or data URLs; bare payloads are wrapped as PNG
    pub images: Vec<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl VisionRequest {
    pub fn new(prompt: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(VellumError::InvalidInput(
                "vision prompt must be non-empty".to_string(),
            ));
        }
        if self.images.is_empty() || self.images.iter().all(|i| i.trim().is_empty()) {
            return Err(VellumError::InvalidInput(
                "at least one non-empty image must be provided".to_string(),
            ));
        }
        Ok(())
    }
}

/// Chat-style text model
#[async_trait]
pub trait TextLlm: Send + Sync {
    async fn call(&self, request: TextRequest) -> Result<String>;
}

/// Chat-style vision model
#[async_trait]
pub trait VisionLlm: Send + Sync {
    async fn call(&self, request: VisionRequest) -> Result<String>;
}
