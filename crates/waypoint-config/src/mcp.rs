use std::time::Duration;

use serde::Deserialize;

use crate::router::deserialize_duration;

/// Tool-server connection pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpConfig {
    /// Maximum number of live connections kept across all conversations
    #[serde(default = "default_max_connections")]
    pub max_connections: u64,
    /// Drop a connection after it has been idle this long
    #[serde(default = "default_idle_timeout", deserialize_with = "deserialize_duration")]
    pub idle_timeout: Duration,
    /// Upper bound on connecting and completing the MCP handshake
    #[serde(default = "default_connect_timeout", deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    /// Upper bound on a single tool call
    #[serde(default = "default_call_timeout", deserialize_with = "deserialize_duration")]
    pub call_timeout: Duration,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u64 {
    32
}
#[allow(clippy::missing_const_for_fn)]
fn default_idle_timeout() -> Duration {
    Duration::from_secs(600)
}
#[allow(clippy::missing_const_for_fn)]
fn default_connect_timeout() -> Duration {
    Duration::from_secs(20)
}
#[allow(clippy::missing_const_for_fn)]
fn default_call_timeout() -> Duration {
    Duration::from_secs(60)
}
