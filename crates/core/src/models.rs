use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Text of a single PDF page, attributed to the file it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub document_id: String,
    pub source_path: String,
    pub page: u32,
    pub text: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
}

/// A chunk returned by retrieval together with its cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub context: Vec<RetrievedChunk>,
    /// Seconds spent on retrieval and generation.
    pub response_time: f64,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    /// Upper bound on pages loaded per ingestion run; later pages are dropped.
    pub max_documents: usize,
    pub embed_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            max_documents: 50,
            embed_batch_size: 64,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap_chars >= self.chunk_max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                self.chunk_overlap_chars, self.chunk_max_chars
            )));
        }
        if self.max_documents == 0 {
            return Err(IngestError::InvalidArgument(
                "max documents must be greater than zero".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding batch size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub queue_capacity: usize,
    /// How long a new file's size must stay unchanged before it is read.
    pub settle_interval: Duration,
    /// Give up waiting for a file to settle after this long and ingest anyway.
    pub settle_timeout: Duration,
    pub max_ingest_attempts: u32,
    /// Backoff before the first re-attempt of a transiently failed ingestion.
    pub ingest_retry_delay: Duration,
    pub dead_letter_dir: PathBuf,
    pub scan_existing: bool,
}

impl WatcherOptions {
    pub fn for_folder(folder: impl Into<PathBuf>) -> Self {
        let folder = folder.into();
        Self {
            queue_capacity: 16,
            settle_interval: Duration::from_millis(500),
            settle_timeout: Duration::from_secs(30),
            max_ingest_attempts: 3,
            ingest_retry_delay: Duration::from_secs(2),
            dead_letter_dir: folder.join("failed"),
            scan_existing: false,
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.queue_capacity == 0 {
            return Err(IngestError::InvalidArgument(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_ingest_attempts == 0 {
            return Err(IngestError::InvalidArgument(
                "max ingest attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(IngestionOptions::default().validate().is_ok());
        assert!(QueryOptions::default().validate().is_ok());
        assert!(WatcherOptions::for_folder("shared_documents")
            .validate()
            .is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let options = IngestionOptions {
            chunk_max_chars: 100,
            chunk_overlap_chars: 100,
            ..IngestionOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(QueryOptions { top_k: 0 }.validate().is_err());
    }

    #[test]
    fn dead_letter_dir_defaults_inside_watched_folder() {
        let options = WatcherOptions::for_folder("/srv/inbox");
        assert_eq!(options.dead_letter_dir, PathBuf::from("/srv/inbox/failed"));
    }

    #[test]
    fn retrieved_chunk_serializes_flat() {
        let retrieved = RetrievedChunk {
            chunk: Chunk {
                chunk_id: "c1".to_string(),
                document_id: "d1".to_string(),
                source_path: "/tmp/a.pdf".to_string(),
                page: 2,
                chunk_index: 0,
                text: "hello".to_string(),
            },
            score: 0.5,
        };

        let value = serde_json::to_value(&retrieved).expect("chunk should serialize");
        assert_eq!(value["text"], "hello");
        assert_eq!(value["page"], 2);
        assert_eq!(value["score"], 0.5);
    }
}
