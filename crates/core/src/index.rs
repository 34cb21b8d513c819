use crate::error::IngestError;
use crate::models::{Chunk, RetrievedChunk};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// An immutable set of chunk embeddings. A new snapshot is built for every
/// ingestion run and replaces the previous one wholesale.
#[derive(Debug)]
pub struct VectorIndex {
    id: Uuid,
    dimensions: usize,
    built_at: DateTime<Utc>,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IngestError> {
        if chunks.len() != embeddings.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(IngestError::EmbeddingMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            dimensions,
            built_at: Utc::now(),
            entries,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `top_k` chunks most similar to `query`, best first. Ties keep
    /// document order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, IngestError> {
        if !self.entries.is_empty() && query.len() != self.dimensions {
            return Err(IngestError::EmbeddingMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, query),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Single-slot holder for the active index. Publishing swaps the whole
/// snapshot in one step, and readers keep the `Arc` they took for as long as
/// they need it, so nobody observes a half-built index.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    slot: Arc<watch::Sender<Option<Arc<VectorIndex>>>>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            slot: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.slot.borrow().clone()
    }

    /// Replaces the active index, returning the one it displaced.
    pub fn publish(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        self.slot.send_replace(Some(Arc::new(index)))
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }
}
