use async_trait::async_trait;
use serde_json::{Map, Value};
use waypoint_mcp::{ConnectionPool, McpError, ToolOutput};

/// A tool as offered to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the arguments object
    pub input_schema: Value,
}

/// Where tool calls go
///
/// [`ConnectionPool`] is the production host; tests substitute their own.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Tools exposed by a server, connecting if needed
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, McpError>;

    /// Invoke one tool
    async fn call_tool(&self, server: &str, tool: &str, arguments: Option<Map<String, Value>>)
    -> Result<ToolOutput, McpError>;

    /// Drop any session held for a server
    fn forget(&self, server: &str);
}

#[async_trait]
impl ToolHost for ConnectionPool {
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, McpError> {
        let client = self.get_or_connect(server).await?;
        let tools = client.list_tools().await?;

        Ok(tools
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(ToString::to_string),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, McpError> {
        let client = self.get_or_connect(server).await?;
        client.call_tool(tool, arguments).await
    }

    fn forget(&self, server: &str) {
        self.invalidate(server);
    }
}
