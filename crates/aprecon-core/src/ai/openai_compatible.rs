//! OpenAI-compatible backend implementation
//!
//! Works with the OpenAI API itself and any server that implements the
//! chat completions endpoint (vLLM, LocalAI, llama-server, Docker Model Runner).
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default https://api.openai.com when a key is set)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4)
//! - `OPENAI_COMPATIBLE_API_KEY` or `OPENAI_API_KEY`: API key (optional for local servers)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{NarrativeBackend, NarrativeRequest, REQUEST_TIMEOUT};

const OPENAI_HOST: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4";

/// OpenAI-compatible backend
///
/// ```rust,ignore
/// // OpenAI
/// export AI_BACKEND=openai
/// export OPENAI_API_KEY="sk-..."
///
/// // vLLM
/// export AI_BACKEND=openai_compatible
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="meta-llama/Llama-3.2-3B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create from a variable lookup
    ///
    /// The host defaults to the OpenAI API only when a key is available;
    /// a keyless setup must name its server explicitly.
    pub(crate) fn from_vars<F>(var: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = var("OPENAI_COMPATIBLE_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        let host = match var("OPENAI_COMPATIBLE_HOST") {
            Some(host) => host,
            None if api_key.is_some() => OPENAI_HOST.to_string(),
            None => return None,
        };
        let model = var("OPENAI_COMPATIBLE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut backend = Self::new(&host, &model);
        backend.api_key = api_key;
        Some(backend)
    }

    fn build_request(&self, request: &NarrativeRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            stream: false,
        }
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Content is null when the model produced nothing
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl NarrativeBackend for OpenAICompatibleBackend {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String> {
        let body = self.build_request(request);

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Narrative(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Narrative("No choices in chat completion response".into()))?
            .message
            .content
            .unwrap_or_default();

        debug!(model = %self.model, chars = content.len(), "Chat completion received");
        Ok(content.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        if let Ok(resp) = req.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Local servers often expose /health instead
        match self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
