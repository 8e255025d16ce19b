use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::ConversationTurn;

/// Name of the standing capability that lets the agent ask for more tools
pub const DISCOVER_TOOLS: &str = "discover_tools";

/// Input to one agent execution
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Conversation so far, ending with the pending user turn
    pub messages: Vec<ConversationTurn>,
    /// Model identifier
    pub model: String,
    /// Identifiers of the tool servers the agent may call
    pub servers: Vec<String>,
    /// System instructions
    pub instructions: String,
    /// Maximum agent steps
    pub max_steps: u32,
}

/// A single tool call made during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Server the tool belongs to
    pub server: String,
    /// Tool name on that server
    pub tool: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Wall-clock duration of the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolInvocation {
    /// A successful call
    pub fn succeeded(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
            success: true,
            duration_ms: None,
        }
    }

    /// A failed call
    pub fn failed(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::succeeded(server, tool)
        }
    }
}

/// The agent asked for tool servers matching these queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Short natural-language capability descriptions
    pub queries: Vec<String>,
}

/// Result of one agent execution
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    /// Final assistant text (may be empty when discovery was requested)
    pub final_output: String,
    /// Tool calls in the order they were made
    pub invocations: Vec<ToolInvocation>,
    /// Steps consumed
    pub steps_used: u32,
    /// Present when the agent stopped to request discovery
    pub discovery: Option<DiscoveryRequest>,
}

/// Whole-call failure of the agent runtime
///
/// Per-tool failures are reported through [`ToolInvocation::success`]
/// and never surface here.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Could not reach the agent runtime
    #[error("agent transport error: {0}")]
    Transport(String),

    /// The agent runtime answered with an error status
    #[error("agent runtime returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The response could not be interpreted
    #[error("agent protocol error: {0}")]
    Protocol(String),
}

/// Runs an agent against a set of tool servers
///
/// The discovery capability is always offered. When the agent uses it,
/// the executor stops and returns the request in
/// [`AgentOutcome::discovery`] instead of calling back into the router.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute one agent run
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError>;

    /// Drop any live connection to a server that was marked unhealthy
    fn forget_server(&self, _server: &str) {}
}
