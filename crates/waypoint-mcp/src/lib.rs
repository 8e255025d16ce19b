//! Connections to MCP tool servers
//!
//! [`ConnectionPool`] hands out shared, lazily connected clients keyed by
//! registry identifier. Idle connections are dropped after a while and a
//! server marked unhealthy can be evicted explicitly.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod client;
mod error;
mod pool;

pub use client::{McpClient, ToolOutput};
pub use error::McpError;
pub use pool::ConnectionPool;
pub use rmcp::model::Tool;
