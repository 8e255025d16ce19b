use thiserror::Error;

/// Tool-server connection errors
#[derive(Debug, Error)]
pub enum McpError {
    /// The identifier is not in the registry
    #[error("server not found: {server}")]
    ServerNotFound { server: String },

    /// The registry entry has no usable transport
    #[error("no transport configured for server {server}")]
    NoTransport { server: String },

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish in time
    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    /// The tool ran and reported an error
    #[error("tool execution failed: {0}")]
    Execution(String),
}
