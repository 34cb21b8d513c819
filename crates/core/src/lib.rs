pub mod chunking;
pub mod dead_letter;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod query;
pub mod retry;
pub mod traits;
pub mod watcher;

pub use chunking::{normalize_page_text, split_document, split_text, ChunkingConfig};
pub use dead_letter::{DeadLetterQueue, DeadLetterRecord};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, ProviderError, QueryError, MISSING_QUERY_MESSAGE};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexHandle, VectorIndex};
pub use ingest::{discover_pdf_files, is_pdf_path, IngestionPipeline, IngestionReport};
pub use models::{
    Answer, Chunk, Document, IngestionOptions, QueryOptions, RetrievedChunk, WatcherOptions,
};
pub use prompt::PromptTemplate;
pub use providers::chat::ChatCompletionsLlm;
pub use providers::openai::OpenAiEmbeddings;
pub use query::QueryService;
pub use retry::RetryPolicy;
pub use traits::{EmbeddingProvider, LlmProvider};
pub use watcher::FolderWatcher;
