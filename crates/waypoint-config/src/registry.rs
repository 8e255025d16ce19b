use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// A tool server the router may discover and connect to
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    /// Unique server identifier (URL or marketplace slug)
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Coarse category (e.g. "finance")
    #[serde(default)]
    pub category: Option<String>,
    /// Free-text capability description
    pub description: String,
    /// Search keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// How to reach the server; defaults to streamable HTTP at `id` when it is a URL
    #[serde(default)]
    pub transport: Option<ServerTransport>,
}

impl RegistryEntry {
    /// Build an entry with only the required fields
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            category: None,
            description: description.into(),
            keywords: Vec::new(),
            transport: None,
        }
    }

    /// Resolve the transport, falling back to the identifier as an HTTP endpoint
    pub fn resolved_transport(&self) -> Option<ServerTransport> {
        if let Some(ref transport) = self.transport {
            return Some(transport.clone());
        }

        let url = Url::parse(&self.id).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| ServerTransport::StreamableHttp(HttpTransport { url, auth: None }))
    }
}

/// Tool server transport types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerTransport {
    /// STDIO subprocess
    Stdio(StdioTransport),
    /// HTTP with SSE
    Sse(HttpTransport),
    /// HTTP with streamable protocol
    StreamableHttp(HttpTransport),
}

/// STDIO transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdioTransport {
    /// Command to execute
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpTransport {
    /// Server URL
    pub url: Url,
    /// Static bearer token
    #[serde(default)]
    pub auth: Option<SecretString>,
}
