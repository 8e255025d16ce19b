use async_trait::async_trait;
use thiserror::Error;

/// Failure of the external embedding service
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Transport or authentication failure
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something unusable
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Turns text into fixed-length vectors
///
/// Output has the same length and order as the input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}
