//! Mock model backend for integration tests
//!
//! Serves a minimal OpenAI-compatible API: keyword embeddings and a chat
//! endpoint that plays back a scripted sequence of replies.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Terms the mock embedder counts; every text maps to a bag of these
const VOCABULARY: &[&str] = &[
    "stock", "price", "data", "market", "web", "fetch", "page", "weather", "forecast", "translate", "text", "news",
];

/// One scripted assistant reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain text answer
    Text(String),
    /// Ask the router for tool servers
    Discover(Vec<String>),
    /// Call the offered function whose name ends with `__{tool}`
    CallTool { tool: String, arguments: Value },
    /// Answer with HTTP 500
    Fail,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_owned())
    }

    pub fn discover(queries: &[&str]) -> Self {
        Self::Discover(queries.iter().map(|q| (*q).to_owned()).collect())
    }

    pub fn call(tool: &str, arguments: Value) -> Self {
        Self::CallTool {
            tool: tool.to_owned(),
            arguments,
        }
    }
}

/// Mock backend with a scripted chat endpoint
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    embedding_count: AtomicU32,
    script: Mutex<VecDeque<Reply>>,
    /// Request bodies received by the chat endpoint
    completions: Mutex<Vec<Value>>,
}

impl MockLlm {
    /// Start the mock server with an empty script
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_script(Vec::new()).await
    }

    /// Start the mock server, replying with `script` in order then "done"
    pub async fn start_with_script(script: Vec<Reply>) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            embedding_count: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            completions: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/embeddings", routing::post(handle_embeddings))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including `/v1`, as the clients append `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of chat completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Number of embedding requests received
    pub fn embedding_count(&self) -> u32 {
        self.state.embedding_count.load(Ordering::Relaxed)
    }

    /// Chat request bodies in arrival order
    pub fn completions(&self) -> Vec<Value> {
        self.state.completions.lock().unwrap().clone()
    }

    /// Function names offered in the `n`th chat request
    pub fn offered_tools(&self, n: usize) -> Vec<String> {
        self.completions()
            .get(n)
            .map(offered_names)
            .unwrap_or_default()
    }

    /// System prompt of the `n`th chat request
    pub fn instructions(&self, n: usize) -> String {
        self.completions()
            .get(n)
            .and_then(|body| body["messages"][0]["content"].as_str().map(str::to_owned))
            .unwrap_or_default()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Bag-of-words vector over [`VOCABULARY`]
#[allow(clippy::cast_precision_loss)]
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    VOCABULARY
        .iter()
        .map(|term| lower.matches(term).count() as f32)
        .collect()
}

fn offered_names(body: &Value) -> Vec<String> {
    body["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| tool["function"]["name"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

// -- Wire types matching OpenAI format --

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: String,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Serialize)]
struct ToolCallResponse {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: FunctionCallResponse,
}

#[derive(Debug, Serialize)]
struct FunctionCallResponse {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingResponse {
    object: String,
    data: Vec<EmbeddingData>,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingData {
    object: String,
    embedding: Vec<f32>,
    index: usize,
}

// -- Handlers --

async fn handle_chat_completions(State(state): State<Arc<MockLlmState>>, Json(body): Json<Value>) -> impl IntoResponse {
    let call_number = state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.completions.lock().unwrap().push(body.clone());

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::text("done"));

    let call_id = format!("call_{call_number}");
    let tool_call = |name: String, arguments: String| {
        Some(vec![ToolCallResponse {
            id: call_id.clone(),
            tool_type: "function".to_owned(),
            function: FunctionCallResponse { name, arguments },
        }])
    };

    let (content, tool_calls, finish_reason) = match reply {
        Reply::Fail => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": {
                        "message": "mock server intentional failure",
                        "type": "server_error"
                    }
                })),
            )
                .into_response();
        }
        Reply::Text(text) => (Some(text), None, "stop"),
        Reply::Discover(queries) => (
            None,
            tool_call("discover_tools".to_owned(), json!({ "queries": queries }).to_string()),
            "tool_calls",
        ),
        Reply::CallTool { tool, arguments } => {
            let suffix = format!("__{tool}");
            let name = offered_names(&body)
                .into_iter()
                .find(|name| name.ends_with(&suffix))
                .unwrap_or(tool);
            (None, tool_call(name, arguments.to_string()), "tool_calls")
        }
    };

    let response = ChatCompletionResponse {
        id: format!("chatcmpl-test-{call_number}"),
        object: "chat.completion".to_owned(),
        created: 1_700_000_000,
        model: body["model"].as_str().unwrap_or_default().to_owned(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_owned(),
                content,
                tool_calls,
            },
            finish_reason: finish_reason.to_owned(),
        }],
    };

    Json(response).into_response()
}

async fn handle_embeddings(
    State(state): State<Arc<MockLlmState>>,
    Json(req): Json<EmbeddingRequest>,
) -> impl IntoResponse {
    state.embedding_count.fetch_add(1, Ordering::Relaxed);

    let data = req
        .input
        .iter()
        .enumerate()
        .map(|(index, text)| EmbeddingData {
            object: "embedding".to_owned(),
            embedding: keyword_vector(text),
            index,
        })
        .collect();

    Json(EmbeddingResponse {
        object: "list".to_owned(),
        data,
        model: req.model,
    })
}
