use thiserror::Error;

/// Message returned to callers when the question is missing or blank.
pub const MISSING_QUERY_MESSAGE: &str = "Query parameter is required";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {provider} failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from {provider}: {details}")]
    InvalidResponse { provider: String, details: String },

    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Transport failures, rate limiting and server-side errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse { .. } | Self::Config(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no readable documents in {0}")]
    NoDocuments(String),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    EmbeddingMismatch { expected: usize, actual: usize },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl IngestError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(error) => error.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),

    #[error("vector index is not ready: no documents have been ingested yet")]
    IndexNotReady,

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl QueryError {
    pub fn missing_query() -> Self {
        Self::Validation(MISSING_QUERY_MESSAGE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let api = |status| ProviderError::Api {
            provider: "openai".to_string(),
            status,
            message: "boom".to_string(),
        };

        assert!(api(500).is_transient());
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(401).is_transient());
        assert!(!ProviderError::Config("bad url".to_string()).is_transient());
    }

    #[test]
    fn ingest_errors_delegate_transience_to_provider() {
        let transient = IngestError::Provider(ProviderError::Api {
            provider: "openai".to_string(),
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert!(transient.is_transient());
        assert!(!IngestError::PdfParse("broken xref".to_string()).is_transient());
    }

    #[test]
    fn missing_query_uses_fixed_message() {
        assert_eq!(
            QueryError::missing_query().to_string(),
            "Query parameter is required"
        );
    }
}
