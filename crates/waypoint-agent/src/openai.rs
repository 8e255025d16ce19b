//! Agent executor over an OpenAI-compatible chat completions endpoint
//!
//! Runs the usual function-calling loop: send the conversation with the tool
//! definitions, execute any tool calls the model makes, feed results back,
//! and repeat until the model answers in text or the step budget runs out.
//! A call to `discover_tools` ends the run early so the router can search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;
use waypoint_core::{
    AgentError, AgentExecutor, AgentOutcome, AgentRequest, ConversationTurn, DISCOVER_TOOLS, DiscoveryRequest, Role,
    ToolInvocation,
};

use crate::protocol::{ChatMessage, ChatRequest, ChatResponse, ChatTool, ToolCall};
use crate::tool_host::ToolHost;

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Separates the server alias from the tool name in function names
const NAME_SEPARATOR: &str = "__";

/// Tool name recorded when a server could not be reached at all
pub const CONNECT_TOOL: &str = "<connect>";

/// Arguments of the discovery function
#[derive(Debug, Deserialize, JsonSchema)]
struct DiscoverToolsArgs {
    /// Short natural-language descriptions of the capabilities you need,
    /// e.g. ["stock market data", "text translation"]
    queries: Vec<String>,
}

/// Agent executor backed by chat completions with function calling
pub struct OpenAiAgent {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    tools: Arc<dyn ToolHost>,
    call_timeout: Duration,
}

impl OpenAiAgent {
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(
        base_url: Option<Url>,
        api_key: Option<SecretString>,
        tools: Arc<dyn ToolHost>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL")),
            api_key,
            tools,
            call_timeout,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage, AgentError> {
        let mut builder = self.client.post(self.completions_url()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "chat completion request failed");
            AgentError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "agent runtime returned error");
            return Err(AgentError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        let wire: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Protocol(format!("failed to parse response: {e}")))?;

        wire.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AgentError::Protocol("response contained no choices".to_owned()))
    }

    /// Collect tool definitions for every server, aliased to safe names
    async fn tool_catalog(&self, servers: &[String], invocations: &mut Vec<ToolInvocation>) -> Catalog {
        let mut catalog = Catalog {
            tools: vec![discover_tools_definition()],
            routes: HashMap::new(),
        };

        for (index, server) in servers.iter().enumerate() {
            let alias = format!("s{index}");

            match self.tools.list_tools(server).await {
                Ok(specs) => {
                    for spec in specs {
                        let name = format!("{alias}{NAME_SEPARATOR}{}", spec.name);
                        catalog.routes.insert(name.clone(), (server.clone(), spec.name));
                        catalog.tools.push(ChatTool::function(name, spec.description, spec.input_schema));
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "could not list tools");
                    invocations.push(ToolInvocation::failed(server.as_str(), CONNECT_TOOL));
                }
            }
        }

        catalog
    }

    async fn invoke(&self, server: &str, tool: &str, arguments: &str) -> (ToolInvocation, String) {
        let started = Instant::now();

        let arguments = match parse_arguments(arguments) {
            Ok(arguments) => arguments,
            Err(message) => return (ToolInvocation::failed(server, tool), message),
        };

        let result = tokio::time::timeout(self.call_timeout, self.tools.call_tool(server, tool, arguments)).await;

        let (success, content) = match result {
            Ok(Ok(output)) => (!output.is_error, output.text),
            Ok(Err(e)) => (false, format!("error: {e}")),
            Err(_) => (false, format!("error: timed out after {}s", self.call_timeout.as_secs())),
        };

        let mut invocation = if success {
            ToolInvocation::succeeded(server, tool)
        } else {
            ToolInvocation::failed(server, tool)
        };
        invocation.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        tracing::debug!(server, tool, success, "tool call finished");
        (invocation, content)
    }
}

struct Catalog {
    tools: Vec<ChatTool>,
    /// function name -> (server id, tool name)
    routes: HashMap<String, (String, String)>,
}

#[async_trait]
impl AgentExecutor for OpenAiAgent {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        let mut invocations = Vec::new();
        let catalog = self.tool_catalog(&request.servers, &mut invocations).await;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::text("system", request.instructions.clone()));
        messages.extend(request.messages.iter().map(to_chat_message));

        let mut chat = ChatRequest {
            model: strip_model_prefix(&request.model).to_owned(),
            messages,
            tools: catalog.tools,
        };

        let mut last_text = String::new();

        for step in 1..=request.max_steps {
            let reply = self.complete(&chat).await?;
            last_text = reply.content.clone().unwrap_or_default();

            if reply.tool_calls.is_empty() {
                return Ok(AgentOutcome {
                    final_output: last_text,
                    invocations,
                    steps_used: step,
                    discovery: None,
                });
            }

            let calls = reply.tool_calls.clone();
            chat.messages.push(reply);

            let mut discovery: Option<DiscoveryRequest> = None;

            for call in &calls {
                let content = if call.function.name == DISCOVER_TOOLS {
                    match parse_discovery(call) {
                        Ok(queries) => {
                            discovery
                                .get_or_insert_with(|| DiscoveryRequest { queries: Vec::new() })
                                .queries
                                .extend(queries);
                            "Searching for matching tool servers.".to_owned()
                        }
                        Err(message) => message,
                    }
                } else if let Some((server, tool)) = catalog.routes.get(&call.function.name) {
                    let (invocation, content) = self.invoke(server, tool, &call.function.arguments).await;
                    invocations.push(invocation);
                    content
                } else {
                    format!("error: unknown tool '{}'", call.function.name)
                };

                chat.messages.push(ChatMessage::tool_result(&call.id, content));
            }

            if let Some(discovery) = discovery {
                tracing::debug!(queries = ?discovery.queries, "agent requested discovery");
                return Ok(AgentOutcome {
                    final_output: last_text,
                    invocations,
                    steps_used: step,
                    discovery: Some(discovery),
                });
            }
        }

        tracing::warn!(max_steps = request.max_steps, "agent ran out of steps");

        if last_text.is_empty() {
            last_text = "I could not finish within the allowed number of steps.".to_owned();
        }

        Ok(AgentOutcome {
            final_output: last_text,
            invocations,
            steps_used: request.max_steps,
            discovery: None,
        })
    }

    fn forget_server(&self, server: &str) {
        self.tools.forget(server);
    }
}

fn to_chat_message(turn: &ConversationTurn) -> ChatMessage {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    ChatMessage::text(role, turn.content.clone())
}

fn strip_model_prefix(model: &str) -> &str {
    model.split_once('/').map_or(model, |(_, name)| name)
}

fn parse_arguments(raw: &str) -> Result<Option<Map<String, Value>>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(Value::Null) => Ok(None),
        Ok(_) => Err("error: tool arguments must be a JSON object".to_owned()),
        Err(e) => Err(format!("error: invalid tool arguments: {e}")),
    }
}

fn parse_discovery(call: &ToolCall) -> Result<Vec<String>, String> {
    serde_json::from_str::<DiscoverToolsArgs>(&call.function.arguments)
        .map(|args| args.queries)
        .map_err(|e| format!("error: {DISCOVER_TOOLS} expects {{\"queries\": [..]}}: {e}"))
}

fn discover_tools_definition() -> ChatTool {
    let mut parameters = serde_json::to_value(schemars::schema_for!(DiscoverToolsArgs)).unwrap_or_default();
    if let Value::Object(map) = &mut parameters {
        map.remove("$schema");
        map.remove("title");
    }

    ChatTool::function(
        DISCOVER_TOOLS.to_owned(),
        Some(
            "Search for tool servers that provide the capabilities described in the queries. \
             Call this with multiple queries if the task requires different capabilities."
                .to_owned(),
        ),
        parameters,
    )
}
