//! Agent execution for the Waypoint router
//!
//! [`OpenAiAgent`] drives an OpenAI-compatible model through a
//! function-calling loop, with tool calls routed to MCP servers through a
//! [`ToolHost`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod openai;
mod protocol;
mod tool_host;

use std::sync::Arc;

use waypoint_config::{AgentProviderType, Config};
use waypoint_core::AgentExecutor;

pub use openai::{CONNECT_TOOL, OpenAiAgent};
pub use tool_host::{ToolHost, ToolSpec};

/// Build the configured agent executor on top of a tool host
pub fn build_executor(config: &Config, tools: Arc<dyn ToolHost>) -> Arc<dyn AgentExecutor> {
    match config.agent.provider_type {
        AgentProviderType::Openai => {
            if config.agent.api_key.is_none() {
                tracing::warn!("agent.api_key is not set, requests will be sent unauthenticated");
            }

            Arc::new(OpenAiAgent::new(
                config.agent.base_url.clone(),
                config.agent.api_key.clone(),
                tools,
                config.mcp.call_timeout,
            ))
        }
    }
}
