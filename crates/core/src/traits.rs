use crate::error::ProviderError;
use async_trait::async_trait;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::InvalidResponse {
            provider: self.name().to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Generates an answer from a fully rendered prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}
