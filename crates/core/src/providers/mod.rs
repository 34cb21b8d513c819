pub mod chat;
pub mod openai;

pub use chat::ChatCompletionsLlm;
pub use openai::OpenAiEmbeddings;

use crate::error::ProviderError;
use serde::Deserialize;
use url::Url;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Joins `path` onto an API base URL, keeping any path prefix the base has.
pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url, ProviderError> {
    let mut base = Url::parse(base_url)
        .map_err(|error| ProviderError::Config(format!("invalid base url {base_url}: {error}")))?;

    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    base.join(path)
        .map_err(|error| ProviderError::Config(format!("invalid endpoint {path}: {error}")))
}

pub(crate) fn require_api_key(provider: &str, api_key: String) -> Result<String, ProviderError> {
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(ProviderError::Config(format!(
            "{provider} API key must not be empty"
        )));
    }
    Ok(api_key)
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turns a non-success response into `ProviderError::Api`, preferring the
/// OpenAI-style `{"error": {"message": ...}}` body when present.
pub(crate) async fn api_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);

    ProviderError::Api {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    }
}
