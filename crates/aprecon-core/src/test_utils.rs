//! Test utilities for aprecon-core
//!
//! A mock narrative server speaking both the OpenAI chat completions and
//! the Ollama generate APIs, for development and integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Reply used when a test does not configure one
pub const DEFAULT_REPLY: &str =
    "The September AP increase reflects large supplier invoices received late in the month.";

#[derive(Clone)]
struct ServerState {
    reply: String,
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

/// Mock narrative server for testing and development
pub struct MockNarrativeServer {
    addr: SocketAddr,
    prompts: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockNarrativeServer {
    /// Start a server that answers every generation with `DEFAULT_REPLY`
    pub async fn start() -> Self {
        Self::start_with(DEFAULT_REPLY, false).await
    }

    /// Start a server that answers every generation with `reply`
    pub async fn with_reply(reply: &str) -> Self {
        Self::start_with(reply, false).await
    }

    /// Start a server whose generation endpoints return HTTP 500
    pub async fn failing() -> Self {
        Self::start_with("", true).await
    }

    async fn start_with(reply: &str, fail: bool) -> Self {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            reply: reply.to_string(),
            fail,
            prompts: prompts.clone(),
        };

        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            prompts,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// User prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockNarrativeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record(state: &ServerState, prompt: String) {
    state.prompts.lock().unwrap().push(prompt);
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "model backend unavailable",
    )
        .into_response()
}

async fn handle_tags() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "models": [{ "name": "llama3.2:latest" }] }))
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "object": "list", "data": [{ "id": "gpt-4" }] }))
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    record(&state, request.prompt);
    if state.fail {
        return failure();
    }
    Json(GenerateResponse {
        model: request.model,
        response: state.reply.clone(),
        done: true,
    })
    .into_response()
}

/// OpenAI chat completions endpoint
async fn handle_chat(
    State(state): State<ServerState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();
    record(&state, prompt);
    if state.fail {
        return failure();
    }
    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": state.reply },
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}
