//! OpenAI-compatible model backend.
//!
//! Works with any endpoint exposing `/v1/chat/completions`: OpenAI,
//! OpenRouter, Ollama, vLLM, Together AI, and the rest.

use async_trait::async_trait;
use brandloom_core::error::ModelError;
use brandloom_core::{ChatModel, ModelRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A chat model behind an OpenAI-compatible HTTP endpoint.
pub struct OpenAiCompatModel {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            max_tokens,
            client,
        })
    }

    /// Ollama convenience constructor. No real key required.
    pub fn ollama(model: impl Into<String>) -> Result<Self, ModelError> {
        Self::new(
            "http://localhost:11434/v1",
            "ollama",
            model,
            0.7,
            4096,
            120,
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ApiRequest {
            model: &self.model,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: &request.system,
                },
                ApiMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug!(model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ModelError::ApiError {
                status_code: status,
                message: "Invalid API key or insufficient permissions".into(),
            });
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model endpoint returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::MalformedResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let model =
            OpenAiCompatModel::new("https://api.openai.com/v1/", "sk-test", "gpt-4o-mini", 0.7, 4096, 120)
                .unwrap();
        assert_eq!(model.base_url, "https://api.openai.com/v1");
        assert_eq!(model.id(), "gpt-4o-mini");
    }

    #[test]
    fn ollama_constructor_defaults() {
        let model = OpenAiCompatModel::ollama("llama3").unwrap();
        assert!(model.base_url.contains("localhost:11434"));
        assert_eq!(model.id(), "llama3");
    }

    #[test]
    fn request_serializes_both_roles() {
        let body = ApiRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: "You are ORCHESTRATOR",
                },
                ApiMessage {
                    role: "user",
                    content: "hello",
                },
            ],
            temperature: 0.7,
            max_tokens: 4096,
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["stream"], false);
    }

    #[test]
    fn response_with_missing_content_parses() {
        let data = r#"{"choices":[{"message":{"role":"assistant"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn response_content_extracts() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":"{\"text\":\"hi\"}"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"text\":\"hi\"}")
        );
    }
}
