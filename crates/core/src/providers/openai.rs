use super::{api_error, endpoint, require_api_key};
use crate::error::ProviderError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// Embeddings from the OpenAI `/embeddings` API, or any compatible server.
pub struct OpenAiEmbeddings {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::new(),
            url: endpoint(base_url, "embeddings")?,
            api_key: require_api_key(PROVIDER, api_key.into())?,
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            model = %self.model,
            batch_size = texts.len(),
            "requesting embeddings"
        );

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await);
        }

        let mut parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|error| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    details: error.to_string(),
                })?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                details: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() -> Result<(), ProviderError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::with_base_url("sk-test", &format!("{}/v1", server.uri()))?
            .with_model("text-embedding-3-small", 2);
        let vectors = provider
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await?;

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_message() -> Result<(), ProviderError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::with_base_url("sk-bad", &format!("{}/v1", server.uri()))?;
        let error = provider
            .embed("hello")
            .await
            .expect_err("401 should surface as an error");

        match error {
            ProviderError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_embedding_count_is_invalid() -> Result<(), ProviderError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::with_base_url("sk-test", &format!("{}/v1", server.uri()))?;
        let result = provider.embed_batch(&["only".to_string()]).await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse { .. })));
        Ok(())
    }

    #[test]
    fn empty_key_is_rejected_at_construction() {
        assert!(OpenAiEmbeddings::with_base_url("", crate::providers::OPENAI_BASE_URL).is_err());
        assert!(OpenAiEmbeddings::with_base_url("   ", crate::providers::OPENAI_BASE_URL).is_err());
    }
}
