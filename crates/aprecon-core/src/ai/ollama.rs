//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API. The system role is sent as
//! Ollama's `system` field and the sampling limits as `options`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{NarrativeBackend, NarrativeRequest, REQUEST_TIMEOUT};

const DEFAULT_MODEL: &str = "llama3.2";

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars<F>(var: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = var("OLLAMA_HOST")?;
        let model = var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self::new(&host, &model))
    }

    fn build_request(&self, request: &NarrativeRequest) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: Some(request.system.clone()).filter(|s| !s.trim().is_empty()),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    /// Maximum tokens to generate
    num_predict: u32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl NarrativeBackend for OllamaBackend {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String> {
        let body = self.build_request(request);

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Narrative(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(
            model = %self.model,
            chars = ollama_response.response.len(),
            "Ollama response received"
        );

        Ok(ollama_response.response.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
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
