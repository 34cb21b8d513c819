use crate::error::{ProviderError, QueryError};
use crate::index::IndexHandle;
use crate::models::{Answer, QueryOptions};
use crate::prompt::PromptTemplate;
use crate::retry::RetryPolicy;
use crate::traits::{EmbeddingProvider, LlmProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Answers questions from whatever index is active when the call starts.
pub struct QueryService {
    index: IndexHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    prompt: PromptTemplate,
    options: QueryOptions,
    retry: RetryPolicy,
}

impl QueryService {
    pub fn new(
        index: IndexHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            prompt: PromptTemplate::default(),
            options,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::missing_query());
        }

        let snapshot = self.index.snapshot().ok_or(QueryError::IndexNotReady)?;
        let started = Instant::now();

        let query_vector = self
            .retry
            .run("embed_query", || self.embedder.embed(query))
            .await?;

        let context = snapshot
            .search(&query_vector, self.options.top_k)
            .map_err(|error| {
                QueryError::Provider(ProviderError::InvalidResponse {
                    provider: self.embedder.name().to_string(),
                    details: error.to_string(),
                })
            })?;
        debug!(
            index_id = %snapshot.id(),
            retrieved = context.len(),
            "retrieved context"
        );

        let prompt = self.prompt.render(&context, query);
        let answer = self
            .retry
            .run("complete", || self.llm.complete(&prompt))
            .await?;

        let response_time = started.elapsed().as_secs_f64();
        info!(
            index_id = %snapshot.id(),
            context_chunks = context.len(),
            response_time,
            "answered query"
        );

        Ok(Answer {
            answer,
            context,
            response_time,
        })
    }
}
