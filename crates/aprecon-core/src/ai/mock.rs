//! Mock backend for testing
//!
//! Returns a deterministic narrative and records every request it sees.
//! Useful for unit tests and development without a running model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{NarrativeBackend, NarrativeRequest};

/// Mock narrative backend
///
/// Clones share the call counter and request log.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Fixed reply; None produces a reply derived from the prompt
    response: Option<String>,
    /// Fail every call with this cause
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<NarrativeRequest>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    /// Always reply with `text`
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Self::new()
        }
    }

    /// Fail every call with `cause`
    pub fn failing(cause: impl Into<String>) -> Self {
        Self {
            healthy: false,
            failure: Some(cause.into()),
            ..Self::new()
        }
    }

    /// Number of generate calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<NarrativeRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NarrativeBackend for MockBackend {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(ref cause) = self.failure {
            return Err(Error::Narrative(cause.clone()));
        }

        Ok(match self.response {
            Some(ref text) => text.clone(),
            None => format!(
                "Mock analysis: movement reviewed from {} prompt characters.",
                request.prompt.chars().count()
            ),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> NarrativeRequest {
        NarrativeRequest {
            system: String::new(),
            prompt: prompt.to_string(),
            max_tokens: 400,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn test_mock_default_reply() {
        let mock = MockBackend::new();
        let text = mock.generate(&request("abc")).await.unwrap();
        assert_eq!(
            text,
            "Mock analysis: movement reviewed from 3 prompt characters."
        );
    }

    #[tokio::test]
    async fn test_mock_fixed_reply_and_log() {
        let mock = MockBackend::with_response("Large invoices in September.");
        let shared = mock.clone();

        assert_eq!(
            mock.generate(&request("one")).await.unwrap(),
            "Large invoices in September."
        );
        mock.generate(&request("two")).await.unwrap();

        assert_eq!(shared.call_count(), 2);
        let prompts: Vec<String> = shared.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockBackend::failing("connection reset");
        let err = mock.generate(&request("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "Narrative service error: connection reset");
        assert_eq!(mock.call_count(), 1);
        assert!(!mock.health_check().await);
    }
}
