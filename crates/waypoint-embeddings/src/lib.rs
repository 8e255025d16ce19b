//! Embedding clients for the Waypoint registry

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod openai;

use std::sync::Arc;

use waypoint_config::{EmbeddingsConfig, EmbeddingsProviderType};
use waypoint_core::Embedder;

pub use openai::OpenAiEmbedder;

/// Build the configured embedder
pub fn build_embedder(config: &EmbeddingsConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider_type {
        EmbeddingsProviderType::Openai => {
            if config.api_key.is_none() && config.base_url.is_none() {
                anyhow::bail!("embeddings.api_key is required when using the default OpenAI endpoint");
            }

            tracing::debug!(model = %config.model, "using OpenAI-compatible embeddings");

            Ok(Arc::new(OpenAiEmbedder::new(
                config.model.clone(),
                config.api_key.clone(),
                config.base_url.as_ref().map(ToString::to_string),
                config.dimensions,
            )))
        }
    }
}
