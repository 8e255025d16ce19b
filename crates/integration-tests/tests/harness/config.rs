//! Programmatic configuration builder for integration tests

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use waypoint_config::{AgentConfig, Config, EmbeddingsConfig, McpConfig, RegistryEntry, RouterConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Point embeddings and the agent at the mock backend, logging usage into `dir`
    pub fn new(base_url: &str, dir: &Path) -> Self {
        Self {
            config: Config {
                router: RouterConfig {
                    execution_model: "mock/gpt-test".to_owned(),
                    metrics_file: dir.join("metrics.jsonl"),
                    execution_timeout: Duration::from_secs(10),
                    embedding_timeout: Duration::from_secs(10),
                    ..RouterConfig::default()
                },
                embeddings: EmbeddingsConfig {
                    api_key: Some(SecretString::from("test-key")),
                    base_url: Some(base_url.parse().expect("valid URL")),
                    model: "mock/text-embedding-test".to_owned(),
                    ..EmbeddingsConfig::default()
                },
                agent: AgentConfig {
                    api_key: Some(SecretString::from("test-key")),
                    base_url: Some(base_url.parse().expect("valid URL")),
                    ..AgentConfig::default()
                },
                mcp: McpConfig::default(),
                registry: Vec::new(),
                telemetry: None,
            },
        }
    }

    /// Append a registry entry
    pub fn with_server(mut self, id: &str, description: &str) -> Self {
        self.config.registry.push(RegistryEntry::new(id, description));
        self
    }

    /// Adjust router tunables
    pub fn with_router(mut self, f: impl FnOnce(&mut RouterConfig)) -> Self {
        f(&mut self.config.router);
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
