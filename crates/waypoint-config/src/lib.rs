#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod embeddings;
mod env;
mod loader;
pub mod mcp;
pub mod registry;
pub mod router;
pub mod telemetry;

use serde::Deserialize;

pub use agent::*;
pub use embeddings::*;
pub use mcp::McpConfig;
pub use registry::*;
pub use router::*;
pub use telemetry::TelemetryConfig;

/// Top-level Waypoint configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Router tunables
    #[serde(default)]
    pub router: RouterConfig,
    /// Embedding provider used for registry and query vectors
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Agent execution provider
    #[serde(default)]
    pub agent: AgentConfig,
    /// Tool-server connections
    #[serde(default)]
    pub mcp: McpConfig,
    /// Ordered tool-server registry
    #[serde(default)]
    pub registry: Vec<RegistryEntry>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
