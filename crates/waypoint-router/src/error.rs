use thiserror::Error;
use waypoint_core::UserFacingError;

/// Router errors
///
/// `EmbeddingUnavailable` is fatal at startup. `ExecutionFailed` fails a
/// single turn. The rest are non-fatal and either ride along on the turn
/// reply as diagnostics or are only logged.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// The embedding service could not produce vectors
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The agent run (or a discovery search inside it) faulted or timed out
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The agent kept asking for discovery past the per-turn cap
    #[error("discovery limit of {rounds} round(s) exceeded")]
    DiscoveryLimitExceeded { rounds: u32 },

    /// A single tool call failed; its server was put in cooldown
    #[error("tool '{tool}' failed on server {server}")]
    ToolInvocationFailed { server: String, tool: String },

    /// A usage record could not be persisted
    #[error("failed to write usage metrics: {0}")]
    MetricsWriteFailed(String),

    /// A usage log line could not be parsed
    #[error("corrupt usage record at line {line}: {reason}")]
    MetricsReadCorrupt { line: usize, reason: String },
}

impl UserFacingError for RouterError {
    fn error_type(&self) -> &str {
        match self {
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::DiscoveryLimitExceeded { .. } => "discovery_limit_exceeded",
            Self::ToolInvocationFailed { .. } => "tool_invocation_failed",
            Self::MetricsWriteFailed(_) => "metrics_write_failed",
            Self::MetricsReadCorrupt { .. } => "metrics_read_corrupt",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::EmbeddingUnavailable(_) => "the embedding service is unavailable".to_owned(),
            Self::ExecutionFailed(_) => "the assistant could not complete this turn, please try again".to_owned(),
            Self::DiscoveryLimitExceeded { rounds } => {
                format!("stopped looking for new tools after {rounds} attempt(s)")
            }
            Self::ToolInvocationFailed { server, .. } => {
                format!("tool server {server} failed and is paused for now")
            }
            Self::MetricsWriteFailed(_) | Self::MetricsReadCorrupt { .. } => "usage tracking is degraded".to_owned(),
        }
    }
}
