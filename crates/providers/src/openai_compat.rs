//! OpenAI-compatible completion service.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions`. The planner prompt is sent as a single user message.

use async_trait::async_trait;
use cortex_core::completion::CompletionService;
use cortex_core::error::CompletionError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatCompletion {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatCompletion {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CompletionError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "openai".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            client,
        })
    }

    /// OpenAI's public endpoint.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, CompletionError> {
        Self::new(OPENAI_BASE_URL, api_key, model)
    }

    /// A local Ollama server (no key needed).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, CompletionError> {
        Ok(Self::new(base_url.unwrap_or("http://localhost:11434/v1"), "ollama", model)?.with_name("ollama"))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "stream": false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_text(response: ApiResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::Malformed("no message content in response".into()))
}

#[async_trait]
impl CompletionService for OpenAiCompatCompletion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %self.model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Provider returned error");
            return Err(CompletionError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_normalize_base_url() {
        let service = OpenAiCompatCompletion::new("http://localhost:8000/v1/", "k", "m").unwrap();
        assert_eq!(service.base_url, "http://localhost:8000/v1");

        let ollama = OpenAiCompatCompletion::ollama(None, "llama3").unwrap();
        assert_eq!(ollama.name(), "ollama");
        assert!(ollama.base_url.contains("11434"));
    }

    #[test]
    fn prompt_is_a_single_user_message() {
        let service = OpenAiCompatCompletion::openai("k", "gpt-4o-mini")
            .unwrap()
            .with_temperature(0.0);
        let body = service.request_body("add 5 and 3");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "add 5 and 3");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn response_text_is_extracted() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"FUNCTION_CALL: add|a=5|b=3"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "FUNCTION_CALL: add|a=5|b=3");

        let empty: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_text(empty), Err(CompletionError::Malformed(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let service = OpenAiCompatCompletion::new("http://127.0.0.1:1", "k", "m").unwrap();
        let err = service.complete("hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Network(_)));
    }
}
