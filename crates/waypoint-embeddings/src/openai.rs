use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use waypoint_core::{EmbedError, Embedder};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    dimensions: Option<u32>,
}

impl OpenAiEmbedder {
    pub fn new(model: String, api_key: Option<SecretString>, base_url: Option<String>, dimensions: Option<u32>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            model: strip_model_prefix(&model).to_owned(),
            dimensions,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

/// Model names may arrive as "openai/text-embedding-3-small"
fn strip_model_prefix(model: &str) -> &str {
    model.split_once('/').map_or(model, |(_, name)| name)
}

#[derive(Serialize)]
struct WireRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Deserialize)]
struct WireResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

/// Order vectors by their `index` and check they line up with the input
fn into_ordered(mut data: Vec<WireEmbedding>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    if data.len() != expected {
        return Err(EmbedError::Malformed(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);

    if data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(EmbedError::Malformed("embedding indices are not contiguous".to_owned()));
    }

    let dimension = data.first().map_or(0, |d| d.embedding.len());
    if data.iter().any(|d| d.embedding.len() != dimension) {
        return Err(EmbedError::Malformed("embeddings have mixed dimensions".to_owned()));
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = WireRequest {
            input: texts,
            model: &self.model,
            encoding_format: "float",
            dimensions: self.dimensions,
        };

        tracing::debug!(model = %self.model, inputs = texts.len(), "sending embeddings request");

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "embeddings request failed");
            EmbedError::Unavailable(format!("failed to reach embeddings endpoint: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_owned());
            tracing::error!(status = %status, "embeddings API error: {error_text}");
            return Err(EmbedError::Unavailable(format!("embeddings API returned {status}: {error_text}")));
        }

        let wire: WireResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse embeddings response");
            EmbedError::Malformed(e.to_string())
        })?;

        into_ordered(wire.data, texts.len())
    }
}
