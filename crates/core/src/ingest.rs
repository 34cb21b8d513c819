use crate::chunking::{split_document, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{IndexHandle, VectorIndex};
use crate::models::{Document, IngestionOptions};
use crate::retry::RetryPolicy;
use crate::traits::EmbeddingProvider;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// PDFs directly inside `target` (not recursive), or `target` itself when it
/// is a PDF file. Sorted for a stable processing order.
pub fn discover_pdf_files(target: &Path) -> Vec<PathBuf> {
    if target.is_file() {
        return if is_pdf_path(target) {
            vec![target.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(target)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && is_pdf_path(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct LoadReport {
    pub documents: Vec<Document>,
    /// Files that produced at least one kept document.
    pub loaded_files: Vec<PathBuf>,
    pub skipped_files: Vec<SkippedPdf>,
    /// Documents dropped because the cap was reached.
    pub truncated: usize,
}

/// Loads one document per readable page from every PDF under `target`,
/// keeping at most `max_documents` in file-then-page order.
pub fn load_documents(
    target: &Path,
    extractor: &dyn PdfExtractor,
    max_documents: usize,
) -> Result<LoadReport, IngestError> {
    let files = discover_pdf_files(target);

    if files.is_empty() {
        return Err(IngestError::NoDocuments(format!(
            "no pdf files found at {}",
            target.display()
        )));
    }

    let mut documents = Vec::new();
    let mut loaded_files = Vec::new();
    let mut skipped_files = Vec::new();
    let mut truncated = 0;

    for path in files {
        let pages = match extractor.extract_pages(&path) {
            Ok(pages) => pages,
            Err(error) => {
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let room = max_documents.saturating_sub(documents.len());
        truncated += pages.len().saturating_sub(room);
        if room == 0 {
            continue;
        }

        let source_path = path.to_string_lossy().to_string();
        let document_id = generate_document_id(&path);
        let loaded_at = Utc::now();
        documents.extend(pages.into_iter().take(room).map(|page| Document {
            document_id: document_id.clone(),
            source_path: source_path.clone(),
            page: page.number,
            text: page.text,
            loaded_at,
        }));
        loaded_files.push(path);
    }

    Ok(LoadReport {
        documents,
        loaded_files,
        skipped_files,
        truncated,
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub index_id: Uuid,
    pub documents: usize,
    pub chunks: usize,
    pub truncated: usize,
    pub deleted_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
}

/// Loads, splits and embeds PDFs, then publishes a freshly built index that
/// replaces the active one and removes the ingested files.
pub struct IngestionPipeline {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: IndexHandle,
    options: IngestionOptions,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: IndexHandle,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        Ok(Self {
            extractor: Arc::new(LopdfExtractor),
            embedder,
            index,
            options,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub async fn ingest(&self, target: &Path) -> Result<IngestionReport, IngestError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, target = %target.display(), "ingestion started");

        let extractor = Arc::clone(&self.extractor);
        let owned_target = target.to_path_buf();
        let max_documents = self.options.max_documents;
        let report = tokio::task::spawn_blocking(move || {
            load_documents(&owned_target, extractor.as_ref(), max_documents)
        })
        .await
        .map_err(|error| IngestError::Io(std::io::Error::other(error)))??;

        for skipped in &report.skipped_files {
            warn!(%run_id, path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }
        if report.truncated > 0 {
            warn!(
                %run_id,
                max_documents,
                dropped = report.truncated,
                "document cap reached, remaining pages ignored"
            );
        }
        if report.documents.is_empty() {
            let reasons = report
                .skipped_files
                .iter()
                .map(|skipped| format!("{}: {}", skipped.path.display(), skipped.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(IngestError::PdfParse(format!(
                "no readable pdf at {}: {reasons}",
                target.display()
            )));
        }

        let config = ChunkingConfig::from(&self.options);
        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for document in &report.documents {
            let (document_chunks, next_cursor) = split_document(document, config, cursor)?;
            cursor = next_cursor;
            chunks.extend(document_chunks);
        }

        if chunks.is_empty() {
            return Err(IngestError::NoDocuments(target.display().to_string()));
        }
        debug!(%run_id, documents = report.documents.len(), chunks = chunks.len(), "split documents");

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.options.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self
                .retry
                .run("embed_chunks", || self.embedder.embed_batch(&texts))
                .await?;
            if vectors.len() != texts.len() {
                return Err(IngestError::InvalidArgument(format!(
                    "embedding provider returned {} vectors for {} chunks",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
        }

        let chunk_count = chunks.len();
        let index = VectorIndex::build(chunks, embeddings)?;
        if index.dimensions() != self.embedder.dimensions() {
            warn!(
                %run_id,
                expected = self.embedder.dimensions(),
                actual = index.dimensions(),
                "embedding dimension differs from provider's declared size"
            );
        }
        let index_id = index.id();
        self.index.publish(index);

        let mut deleted_files = Vec::new();
        for path in &report.loaded_files {
            match fs::remove_file(path) {
                Ok(()) => deleted_files.push(path.clone()),
                Err(error) => {
                    warn!(%run_id, path = %path.display(), error = %error, "could not delete ingested pdf")
                }
            }
        }

        info!(
            %run_id,
            %index_id,
            documents = report.documents.len(),
            chunks = chunk_count,
            deleted = deleted_files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion finished, index replaced"
        );

        Ok(IngestionReport {
            run_id,
            index_id,
            documents: report.documents.len(),
            chunks: chunk_count,
            truncated: report.truncated,
            deleted_files,
            skipped_files: report
                .skipped_files
                .into_iter()
                .map(|skipped| skipped.path)
                .collect(),
        })
    }
}
