//! Pluggable narrative backend abstraction
//!
//! The investigation step treats text generation as an opaque capability:
//! given a system role and a prompt, return text or fail.
//!
//! # Architecture
//!
//! - `NarrativeBackend` trait: the single generation operation plus health/identity
//! - `NarrativeClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai, openai_compatible, ollama, mock).
//!   When unset, `OPENAI_API_KEY` selects OpenAI and `OLLAMA_HOST` selects Ollama.
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default https://api.openai.com when a key is set)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4)
//! - `OPENAI_COMPATIBLE_API_KEY` / `OPENAI_API_KEY`: Bearer key
//! - `OLLAMA_HOST`: Ollama server URL
//! - `OLLAMA_MODEL`: Model name (default: llama3.2)

mod mock;
mod ollama;
mod openai_compatible;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// Upper bound on a single generation call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    /// System role text
    pub system: String,
    pub prompt: String,
    /// Maximum output length in tokens
    pub max_tokens: u32,
    /// Randomness setting; low favors consistent phrasing
    pub temperature: f32,
}

/// Trait implemented by every narrative backend
#[async_trait]
pub trait NarrativeBackend: Send + Sync {
    /// Generate text for the request
    async fn generate(&self, request: &NarrativeRequest) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete narrative client
#[derive(Clone)]
pub enum NarrativeClient {
    /// OpenAI or any server speaking `/v1/chat/completions`
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama HTTP API
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl NarrativeClient {
    /// Create a client from environment variables
    ///
    /// Returns None if no backend is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create a client from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match var("AI_BACKEND") {
            Some(backend) => backend.to_lowercase(),
            None if var("OPENAI_API_KEY").is_some() => "openai".to_string(),
            None if var("OLLAMA_HOST").is_some() => "ollama".to_string(),
            None => return None,
        };

        match backend.as_str() {
            "openai" | "openai_compatible" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_vars(&var).map(Self::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_vars(&var).map(Self::Ollama),
            "mock" => Some(Self::Mock(MockBackend::new())),
            _ => {
                warn!(backend = %backend, "Unknown AI_BACKEND, no narrative backend configured");
                None
            }
        }
    }

    pub fn openai_compatible(host: &str, model: &str, api_key: Option<&str>) -> Self {
        let backend = match api_key {
            Some(key) => OpenAICompatibleBackend::with_api_key(host, model, key),
            None => OpenAICompatibleBackend::new(host, model),
        };
        Self::OpenAICompatible(backend)
    }

    pub fn ollama(host: &str, model: &str) -> Self {
        Self::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        Self::Mock(MockBackend::new())
    }

    /// Backend name (for display)
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::OpenAICompatible(_) => "openai_compatible",
            Self::Ollama(_) => "ollama",
            Self::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl NarrativeBackend for NarrativeClient {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String> {
        match self {
            Self::OpenAICompatible(b) => b.generate(request).await,
            Self::Ollama(b) => b.generate(request).await,
            Self::Mock(b) => b.generate(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Self::OpenAICompatible(b) => b.health_check().await,
            Self::Ollama(b) => b.health_check().await,
            Self::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAICompatible(b) => b.model(),
            Self::Ollama(b) => b.model(),
            Self::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            Self::OpenAICompatible(b) => b.host(),
            Self::Ollama(b) => b.host(),
            Self::Mock(b) => b.host(),
        }
    }
}
