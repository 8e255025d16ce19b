use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mini_moka::sync::Cache;
use sha2::{Digest, Sha256};
use secrecy::ExposeSecret;
use waypoint_config::{HttpTransport, McpConfig, RegistryEntry, ServerTransport};

use crate::client::McpClient;
use crate::error::McpError;

/// Shared, lazily connected tool-server sessions
///
/// Sessions are keyed by a hash of the server identifier and its transport,
/// so editing a registry entry's transport never reuses a stale session.
pub struct ConnectionPool {
    transports: HashMap<String, ServerTransport>,
    cache: Cache<String, Arc<McpClient>>,
    connect_timeout: Duration,
}

impl ConnectionPool {
    /// Build a pool over every registry entry with a resolvable transport
    pub fn new(entries: &[RegistryEntry], config: &McpConfig) -> Self {
        let transports: HashMap<String, ServerTransport> = entries
            .iter()
            .filter_map(|entry| match entry.resolved_transport() {
                Some(transport) => Some((entry.id.clone(), transport)),
                None => {
                    tracing::warn!(server = %entry.id, "registry entry has no transport, it can be discovered but not called");
                    None
                }
            })
            .collect();

        let cache = Cache::builder()
            .max_capacity(config.max_connections)
            .time_to_idle(config.idle_timeout)
            .build();

        Self {
            transports,
            cache,
            connect_timeout: config.connect_timeout,
        }
    }

    /// Whether `server_id` can be connected at all
    pub fn is_connectable(&self, server_id: &str) -> bool {
        self.transports.contains_key(server_id)
    }

    /// Cached session for `server_id`, connecting on first use
    pub async fn get_or_connect(&self, server_id: &str) -> Result<Arc<McpClient>, McpError> {
        let transport = self.transport(server_id)?;
        let key = cache_key(server_id, transport);

        get_or_insert_with(&self.cache, key, self.connect_timeout, || {
            McpClient::connect(server_id, transport)
        })
        .await
    }

    /// Drop the session for `server_id`; the next use reconnects
    pub fn invalidate(&self, server_id: &str) {
        if let Some(transport) = self.transports.get(server_id) {
            self.cache.invalidate(&cache_key(server_id, transport));
            tracing::debug!(server = server_id, "dropped tool server session");
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transport(&self, server_id: &str) -> Result<&ServerTransport, McpError> {
        self.transports.get(server_id).ok_or_else(|| McpError::NoTransport {
            server: server_id.to_owned(),
        })
    }
}

async fn get_or_insert_with<V, F, Fut>(
    cache: &Cache<String, Arc<V>>,
    key: String,
    timeout: Duration,
    connect: F,
) -> Result<Arc<V>, McpError>
where
    V: Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, McpError>>,
{
    if let Some(value) = cache.get(&key) {
        return Ok(value);
    }

    let value = tokio::time::timeout(timeout, connect())
        .await
        .map_err(|_| McpError::Timeout {
            what: "connecting to tool server".to_owned(),
            secs: timeout.as_secs(),
        })??;

    let value = Arc::new(value);
    cache.insert(key, Arc::clone(&value));
    Ok(value)
}

/// Session key covering everything that shapes the connection
///
/// Only the digest is kept, so bearer tokens and env values never sit in
/// the cache in clear text.
fn cache_key(server_id: &str, transport: &ServerTransport) -> String {
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update(bytes);
        hasher.update(b"\0");
    };
    field(server_id.as_bytes());

    match transport {
        ServerTransport::Stdio(cfg) => {
            field(b"stdio");
            field(cfg.command.as_bytes());
            for arg in &cfg.args {
                field(arg.as_bytes());
            }

            let mut env: Vec<(&String, &String)> = cfg.env.iter().collect();
            env.sort_unstable();
            for (name, value) in env {
                field(name.as_bytes());
                field(value.as_bytes());
            }
        }
        ServerTransport::Sse(cfg) => {
            field(b"sse");
            http_fields(cfg, &mut field);
        }
        ServerTransport::StreamableHttp(cfg) => {
            field(b"streamable");
            http_fields(cfg, &mut field);
        }
    }

    format!("{:x}", hasher.finalize())
}

fn http_fields(cfg: &HttpTransport, field: &mut impl FnMut(&[u8])) {
    field(cfg.url.as_str().as_bytes());
    if let Some(token) = &cfg.auth {
        field(token.expose_secret().as_bytes());
    }
}
