//! Semantic tool routing for LLM agents
//!
//! A [`Runtime`] is built once per process: it embeds the registry, opens the
//! usage log and works out which servers to preload. Each [`Conversation`]
//! created from it keeps its own tool cache, health records and history.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod conversation;
mod error;
mod health;
mod history;
mod instructions;
mod metrics;
mod registry;
#[cfg(test)]
mod testing;
mod tool_cache;

use std::sync::Arc;

use waypoint_config::{RegistryEntry, RouterConfig};
use waypoint_core::{AgentExecutor, Embedder};

pub use conversation::{Conversation, TurnReply};
pub use error::RouterError;
pub use health::HealthTracker;
pub use history::History;
pub use metrics::{UsageMetrics, UsageRecord};
pub use registry::{EmbeddingRegistry, SearchHit, SearchThresholds, cosine_similarity, embedding_text};
pub use tool_cache::ToolCache;

/// Process-wide router state
///
/// Immutable after [`Runtime::initialize`] apart from the usage log, which
/// serializes its own appends.
pub struct Runtime {
    registry: Arc<EmbeddingRegistry>,
    metrics: Arc<UsageMetrics>,
    executor: Arc<dyn AgentExecutor>,
    config: Arc<RouterConfig>,
    preload: Vec<String>,
}

impl Runtime {
    /// Embed the registry and compute the preload set
    ///
    /// Fails with [`RouterError::EmbeddingUnavailable`] if the registry
    /// cannot be embedded; there is no way to route without it.
    pub async fn initialize(
        config: RouterConfig,
        entries: Vec<RegistryEntry>,
        embedder: Arc<dyn Embedder>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Result<Self, RouterError> {
        let registry = EmbeddingRegistry::load(entries, embedder, config.embedding_timeout).await?;
        let metrics = UsageMetrics::open(&config.metrics_file);

        let limit = config.preload_count.min(config.cache_max_size);
        let preload: Vec<String> = metrics
            .ranking(&registry.ids())
            .into_iter()
            .filter(|id| registry.contains(id))
            .take(limit)
            .collect();

        if !preload.is_empty() {
            tracing::info!(servers = ?preload, "preloading tool servers from usage history");
        }

        Ok(Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
            executor,
            config: Arc::new(config),
            preload,
        })
    }

    /// Start a conversation with the preloaded cache
    pub fn conversation(&self) -> Conversation {
        Conversation::new(
            self.registry.clone(),
            self.metrics.clone(),
            self.executor.clone(),
            self.config.clone(),
            &self.preload,
        )
    }

    pub fn registry(&self) -> &EmbeddingRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &UsageMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Servers seeded into every new conversation, most used first
    pub fn preloaded(&self) -> &[String] {
        &self.preload
    }
}
