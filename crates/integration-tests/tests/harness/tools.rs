//! In-memory tool host standing in for MCP servers

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use waypoint_agent::{ToolHost, ToolSpec};
use waypoint_mcp::{McpError, ToolOutput};

/// A recorded tool call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub server: String,
    pub tool: String,
    pub arguments: Option<Map<String, Value>>,
}

struct FakeTool {
    spec: ToolSpec,
    output: ToolOutput,
}

/// Tool host with canned servers
#[derive(Default)]
pub struct FakeTools {
    servers: HashMap<String, Vec<FakeTool>>,
    calls: Mutex<Vec<Call>>,
    forgotten: Mutex<Vec<String>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that answers `text`
    pub fn with_tool(self, server: &str, tool: &str, text: &str) -> Self {
        self.with_output(server, tool, text, false)
    }

    /// Register a tool that reports an error
    pub fn with_failing_tool(self, server: &str, tool: &str, text: &str) -> Self {
        self.with_output(server, tool, text, true)
    }

    fn with_output(mut self, server: &str, tool: &str, text: &str, is_error: bool) -> Self {
        self.servers.entry(server.to_owned()).or_default().push(FakeTool {
            spec: ToolSpec {
                name: tool.to_owned(),
                description: Some(format!("{tool} on {server}")),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            output: ToolOutput {
                text: text.to_owned(),
                is_error,
            },
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }

    fn server(&self, server: &str) -> Result<&[FakeTool], McpError> {
        self.servers
            .get(server)
            .map(Vec::as_slice)
            .ok_or_else(|| McpError::ServerNotFound {
                server: server.to_owned(),
            })
    }
}

#[async_trait]
impl ToolHost for FakeTools {
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, McpError> {
        Ok(self.server(server)?.iter().map(|tool| tool.spec.clone()).collect())
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, McpError> {
        self.calls.lock().unwrap().push(Call {
            server: server.to_owned(),
            tool: tool.to_owned(),
            arguments,
        });

        self.server(server)?
            .iter()
            .find(|t| t.spec.name == tool)
            .map(|t| t.output.clone())
            .ok_or_else(|| McpError::Execution(format!("unknown tool {tool}")))
    }

    fn forget(&self, server: &str) {
        self.forgotten.lock().unwrap().push(server.to_owned());
    }
}
