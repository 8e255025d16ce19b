use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Agent execution provider configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Provider protocol type
    #[serde(rename = "type", default)]
    pub provider_type: AgentProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// Supported agent execution protocols
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProviderType {
    /// OpenAI-compatible chat completions with function calling
    #[default]
    Openai,
}
