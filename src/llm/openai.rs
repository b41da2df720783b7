// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible chat completions client.
//!
//! Works with OpenAI and any API exposing `POST {base_url}/chat/completions`
//! (Ollama, Azure OpenAI, Together, Groq, ...). Only the non-streaming,
//! single-turn subset is used: one user message in, the first choice's text
//! out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProposalError;

use super::LanguageModel;

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama API base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str = "You edit shared markdown documents section by section. \
Reply only with the sections you change, each under its exact top-level heading.";

/// Connection settings for [`OpenAiCompatibleModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl ModelSettings {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    /// Settings for a local Ollama server.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(OLLAMA_BASE_URL, model)
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Client for an OpenAI-compatible endpoint.
pub struct OpenAiCompatibleModel {
    client: Client,
    settings: ModelSettings,
    provider_name: String,
}

impl std::fmt::Debug for OpenAiCompatibleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleModel")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("has_api_key", &self.settings.api_key.is_some())
            .finish()
    }
}

impl OpenAiCompatibleModel {
    /// Create a client. Fails only if the HTTP client cannot be built.
    pub fn new(settings: ModelSettings) -> Result<Self, ProposalError> {
        if settings.model.trim().is_empty() {
            return Err(ProposalError::NotConfigured("model name is empty".to_string()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| ProposalError::NotConfigured(format!("HTTP client: {e}")))?;
        let provider_name = detect_provider_name(&settings.base_url).to_string();

        Ok(Self {
            client,
            settings,
            provider_name,
        })
    }

    /// The model identifier sent with each request.
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: false,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

fn detect_provider_name(base_url: &str) -> &'static str {
    if base_url.contains("openai.com") {
        "OpenAI"
    } else if base_url.contains("localhost:11434") || base_url.contains("ollama") {
        "Ollama"
    } else if base_url.contains("azure") {
        "Azure OpenAI"
    } else if base_url.contains("groq") {
        "Groq"
    } else {
        "OpenAI-Compatible"
    }
}

/// Map a non-success HTTP response to an error.
fn error_from_response(status_code: u16, body: &str) -> ProposalError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    ProposalError::RequestFailed(format!("HTTP {status_code}: {message}"))
}

/// Pull the reply text out of a completion body.
fn extract_text(response: ChatResponse) -> Result<String, ProposalError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProposalError::MalformedResponse("response has no choices".to_string()))?;
    if text.trim().is_empty() {
        return Err(ProposalError::MalformedResponse("response text is empty".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProposalError> {
        let start = Instant::now();
        debug!(
            provider = %self.provider_name,
            model = %self.settings.model,
            prompt_chars = prompt.len(),
            "Sending completion request"
        );

        let mut req = self
            .client
            .post(self.endpoint())
            .timeout(timeout)
            .header("content-type", "application/json");
        if let Some(ref api_key) = self.settings.api_key {
            req = req.header("authorization", format!("Bearer {api_key}"));
        }

        let response = req
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProposalError::Timeout(timeout)
                } else {
                    ProposalError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProposalError::MalformedResponse(e.to_string()))?;

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("llm.generate", start.elapsed());
            if let Some(ref usage) = body.usage {
                GLOBAL_METRICS.record_tokens(usage.prompt_tokens, usage.completion_tokens);
            }
        }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Completion received");

        extract_text(body)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_provider_name() {
        assert_eq!(detect_provider_name(OPENAI_BASE_URL), "OpenAI");
        assert_eq!(detect_provider_name(OLLAMA_BASE_URL), "Ollama");
        assert_eq!(detect_provider_name("https://api.groq.com/openai/v1"), "Groq");
        assert_eq!(detect_provider_name("http://10.0.0.5:8000/v1"), "OpenAI-Compatible");
    }

    #[test]
    fn test_new_rejects_empty_model() {
        let err = OpenAiCompatibleModel::new(ModelSettings::ollama("  ")).unwrap_err();
        assert!(matches!(err, ProposalError::NotConfigured(_)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let model = OpenAiCompatibleModel::new(ModelSettings::new("http://host/v1/", "m")).unwrap();
        assert_eq!(model.endpoint(), "http://host/v1/chat/completions");
        assert_eq!(model.model(), "m");
    }

    #[test]
    fn test_request_serialization() {
        let model = OpenAiCompatibleModel::new(
            ModelSettings::ollama("llama3.2").with_max_tokens(512),
        )
        .unwrap();
        let json = serde_json::to_value(model.build_request("hello")).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_extract_text() {
        let body: ChatResponse = serde_json::from_str(
            r##"{"choices":[{"message":{"role":"assistant","content":"# Scope\nx"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":3}}"##,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "# Scope\nx");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_text(empty),
            Err(ProposalError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_error_from_response() {
        let err = error_from_response(401, r#"{"error":{"message":"Invalid API key"}}"#);
        assert_eq!(
            err,
            ProposalError::RequestFailed("HTTP 401: Invalid API key".to_string())
        );

        let err = error_from_response(502, "bad gateway");
        assert_eq!(err, ProposalError::RequestFailed("HTTP 502: bad gateway".to_string()));
    }
}
