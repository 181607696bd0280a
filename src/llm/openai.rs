//! OpenAI chat completions clients (text and vision)

use async_trait::async_trait;
use serde_json::json;

use crate::error::{is_rate_limit_message, Result, VellumError};
use crate::llm::{TextLlm, TextRequest, VisionLlm, VisionRequest};
use crate::types::wrap_data_url;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

fn classify_llm_failure(status: u16, body: &str) -> VellumError {
    if status == 429 || is_rate_limit_message(body) {
        VellumError::RateLimited(format!("provider returned {}: {}", status, body))
    } else {
        VellumError::Llm(format!("provider returned {}: {}", status, body))
    }
}

async fn chat_completion(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    payload: serde_json::Value,
) -> Result<String> {
    let response = client
        .post(format!("{}/chat/completions", base_url))
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&payload)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_llm_failure(status.as_u16(), &body));
    }

    let data: serde_json::Value = response.json().await?;
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| VellumError::Llm("Invalid chat completion response".to_string()))
}

/// Text model via the OpenAI chat API
pub struct OpenAiTextLlm {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiTextLlm {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VellumError::Config(
                "OpenAI API key is required".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextLlm for OpenAiTextLlm {
    async fn call(&self, request: TextRequest) -> Result<String> {
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = request.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        let messages = request.into_messages()?;

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            max_tokens,
            temperature,
            "calling text model"
        );

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        chat_completion(&self.client, &self.base_url, &self.api_key, payload).await
    }
}

/// Vision model via the OpenAI chat API with image content parts
pub struct OpenAiVisionLlm {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiVisionLlm {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VellumError::Config(
                "OpenAI API key is required".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl VisionLlm for OpenAiVisionLlm {
    async fn call(&self, request: VisionRequest) -> Result<String> {
        request.validate()?;

        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        for image in &request.images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": wrap_data_url(image) },
            }));
        }

        tracing::debug!(
            model = %self.model,
            images = request.images.len(),
            "calling vision model"
        );

        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        chat_completion(&self.client, &self.base_url, &self.api_key, payload).await
    }
}
