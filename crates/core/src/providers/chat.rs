use super::{api_error, endpoint, require_api_key};
use crate::error::ProviderError;
use crate::traits::LlmProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const PROVIDER: &str = "chat-completions";
/// Completions are requested deterministically.
const TEMPERATURE: f32 = 0.0;

/// An LLM behind an OpenAI-compatible `/chat/completions` endpoint, such as Groq.
pub struct ChatCompletionsLlm {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl ChatCompletionsLlm {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::new(),
            url: endpoint(base_url, "chat/completions")?,
            api_key: require_api_key(PROVIDER, api_key.into())?,
            model: model.into(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for ChatCompletionsLlm {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_chars = prompt.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: TEMPERATURE,
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

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|error| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    details: error.to_string(),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                details: "response had no message content".to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.model
    }
}
