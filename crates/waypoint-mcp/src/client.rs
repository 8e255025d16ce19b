use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::{RoleClient, RunningService, ServiceExt as _};
use rmcp::transport::TokioChildProcess;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Mutex;
use waypoint_config::{HttpTransport, ServerTransport, StdioTransport};

use crate::error::McpError;

type Service = RunningService<RoleClient, ()>;

/// Flattened result of a tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Text content blocks joined by newlines; other blocks as JSON
    pub text: String,
    /// The server flagged the call as failed
    pub is_error: bool,
}

/// A live session with one tool server
pub struct McpClient {
    service: Mutex<Service>,
    server_id: String,
    transport: ServerTransport,
}

impl McpClient {
    /// Connect and complete the MCP handshake
    pub async fn connect(server_id: &str, transport: &ServerTransport) -> Result<Self, McpError> {
        let service = open(transport).await?;

        tracing::info!(server = server_id, "connected to tool server");

        Ok(Self {
            service: Mutex::new(service),
            server_id: server_id.to_owned(),
            transport: transport.clone(),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Every tool the server exposes
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        self.service
            .lock()
            .await
            .list_all_tools()
            .await
            .map_err(|e| McpError::Transport(format!("list_tools failed on {}: {e}", self.server_id)))
    }

    /// Call a tool, reconnecting once if the session has gone away
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<ToolOutput, McpError> {
        let first = {
            let guard = self.service.lock().await;
            guard.call_tool(request(name, arguments.clone())).await
        };

        if let Ok(result) = first {
            return Ok(flatten(&result));
        }

        tracing::warn!(server = %self.server_id, tool = name, "tool server session lost, reconnecting");

        let fresh = open(&self.transport).await?;
        let mut guard = self.service.lock().await;
        *guard = fresh;

        guard
            .call_tool(request(name, arguments))
            .await
            .map(|result| flatten(&result))
            .map_err(|e| McpError::Execution(format!("tool '{name}' failed on {} after reconnect: {e}", self.server_id)))
    }

    /// Close the session
    pub async fn shutdown(self) -> Result<(), McpError> {
        self.service
            .into_inner()
            .cancel()
            .await
            .map_err(|e| McpError::Transport(format!("shutdown failed: {e}")))?;
        Ok(())
    }
}

fn request(name: &str, arguments: Option<serde_json::Map<String, Value>>) -> CallToolRequestParam {
    CallToolRequestParam {
        name: Cow::Owned(name.to_owned()),
        arguments,
    }
}

async fn open(transport: &ServerTransport) -> Result<Service, McpError> {
    match transport {
        ServerTransport::Stdio(config) => open_stdio(config).await,
        ServerTransport::Sse(config) => open_sse(config).await,
        ServerTransport::StreamableHttp(config) => open_streamable_http(config).await,
    }
}

async fn open_stdio(config: &StdioTransport) -> Result<Service, McpError> {
    let mut cmd = tokio::process::Command::new(&config.command);
    cmd.args(&config.args);
    cmd.envs(&config.env);

    let transport =
        TokioChildProcess::new(cmd).map_err(|e| McpError::Transport(format!("failed to spawn process: {e}")))?;

    ().serve(transport)
        .await
        .map_err(|e| McpError::Transport(format!("STDIO handshake failed: {e}")))
}

async fn open_sse(config: &HttpTransport) -> Result<Service, McpError> {
    use rmcp::transport::SseClientTransport;
    use rmcp::transport::sse_client::SseClientConfig;

    let sse_config = SseClientConfig {
        sse_endpoint: Arc::from(config.url.as_str()),
        ..Default::default()
    };

    let client = http_client(config.auth.as_ref())?;

    let transport = SseClientTransport::start_with_client(client, sse_config)
        .await
        .map_err(|e| McpError::Transport(format!("SSE connection failed: {e}")))?;

    ().serve(transport)
        .await
        .map_err(|e| McpError::Transport(format!("SSE handshake failed: {e}")))
}

async fn open_streamable_http(config: &HttpTransport) -> Result<Service, McpError> {
    use rmcp::transport::StreamableHttpClientTransport;
    use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;

    let mut transport_config = StreamableHttpClientTransportConfig::with_uri(config.url.as_str());
    if let Some(token) = &config.auth {
        transport_config = transport_config.auth_header(format!("Bearer {}", token.expose_secret()));
    }

    let transport = StreamableHttpClientTransport::with_client(reqwest::Client::new(), transport_config);

    ().serve(transport)
        .await
        .map_err(|e| McpError::Transport(format!("StreamableHTTP handshake failed: {e}")))
}

fn http_client(token: Option<&SecretString>) -> Result<reqwest::Client, McpError> {
    let mut builder = reqwest::Client::builder();

    if let Some(token) = token {
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| McpError::Transport(format!("invalid auth token: {e}")))?;
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| McpError::Transport(format!("failed to build HTTP client: {e}")))
}

fn flatten(result: &CallToolResult) -> ToolOutput {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);
    flatten_value(&value)
}

/// Collapse the wire form of a tool result into plain text
fn flatten_value(value: &Value) -> ToolOutput {
    let blocks = value["content"].as_array().map(Vec::as_slice).unwrap_or_default();

    let mut parts: Vec<String> = blocks
        .iter()
        .map(|block| match block["text"].as_str() {
            Some(text) if block["type"] == "text" => text.to_owned(),
            _ => block.to_string(),
        })
        .collect();

    if parts.is_empty()
        && let Some(structured) = value.get("structuredContent").filter(|v| !v.is_null())
    {
        parts.push(structured.to_string());
    }

    ToolOutput {
        text: parts.join("\n"),
        is_error: value["isError"].as_bool().unwrap_or(false),
    }
}
