use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Embedding provider configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingsConfig {
    /// Provider type
    #[serde(rename = "type", default)]
    pub provider_type: EmbeddingsProviderType,
    /// API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Embedding model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Requested output dimensions (provider default when absent)
    #[serde(default)]
    pub dimensions: Option<u32>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider_type: EmbeddingsProviderType::default(),
            api_key: None,
            base_url: None,
            model: default_model(),
            dimensions: None,
        }
    }
}

/// Supported embeddings providers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingsProviderType {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    Openai,
}

fn default_model() -> String {
    "text-embedding-3-small".to_owned()
}
