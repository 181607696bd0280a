//! Image description via a vision LLM

use std::sync::Arc;

use crate::error::{Result, VellumError};
use crate::llm::{VisionLlm, VisionRequest};

const DESCRIPTION_PROMPT: &str = "Describe this image in detail so the description can be \
used for retrieval: what it shows, any visible text, labels, axes, and figures.";

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Image describer wrapping a vision model
pub struct ImageDescriber {
    llm: Arc<dyn VisionLlm>,
    max_tokens: u32,
    temperature: f32,
}

impl ImageDescriber {
    pub fn new(llm: Arc<dyn VisionLlm>) -> Self {
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

    /// Generate a description for a base64-encoded image
    pub async fn describe(&self, image_base64: &str) -> Result<String> {
        self.describe_with_prompt(image_base64, DESCRIPTION_PROMPT)
            .await
    }

    /// Generate a description with a custom prompt
    pub async fn describe_with_prompt(&self, image_base64: &str, prompt: &str) -> Result<String> {
        if image_base64.trim().is_empty() {
            return Err(VellumError::InvalidInput(
                "image payload must be non-empty".to_string(),
            ));
        }

        let mut request = VisionRequest::new(prompt, vec![image_base64.to_string()]);
        request.max_tokens = Some(self.max_tokens);
        request.temperature = Some(self.temperature);

        let description = self.llm.call(request).await?;
        Ok(description.trim().to_string())
    }
}
