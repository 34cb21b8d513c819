use crate::dead_letter::DeadLetterQueue;
use crate::error::IngestError;
use crate::ingest::{discover_pdf_files, is_pdf_path, IngestionPipeline};
use crate::models::WatcherOptions;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Feeds PDFs arriving in a folder, one at a time and in arrival order, to
/// the ingestion pipeline.
pub struct FolderWatcher {
    folder: PathBuf,
    worker: IngestWorker,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    /// Dropping the watcher stops event delivery.
    _watcher: notify::RecommendedWatcher,
}

impl FolderWatcher {
    /// Creates the folder if needed and starts receiving filesystem events
    /// for it. Events are buffered until [`FolderWatcher::run`] is called.
    pub fn new(
        folder: impl Into<PathBuf>,
        pipeline: Arc<IngestionPipeline>,
        options: WatcherOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;

        let (tx, rx) = mpsc::channel(options.queue_capacity);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;
        watcher.watch(&folder, RecursiveMode::NonRecursive)?;

        Ok(Self {
            folder,
            worker: IngestWorker {
                pipeline,
                dead_letters: DeadLetterQueue::new(options.dead_letter_dir.clone()),
                options,
            },
            event_rx: rx,
            _watcher: watcher,
        })
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped. The
    /// ingestion in flight at that moment is allowed to finish; queued paths
    /// are abandoned.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let (path_tx, path_rx) = mpsc::channel(self.worker.options.queue_capacity);
        let scan_existing = self.worker.options.scan_existing;
        let worker = self.worker.spawn(path_rx, shutdown.clone());

        info!(folder = %self.folder.display(), "watching for new pdfs");

        if scan_existing {
            for path in discover_pdf_files(&self.folder) {
                debug!(path = %path.display(), "queueing pdf found at startup");
                if path_tx.send(path).await.is_err() {
                    break;
                }
            }
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.event_rx.recv() => {
                    let Some(result) = received else { break };
                    match result {
                        Ok(event) => {
                            for path in arrived_pdfs(&event) {
                                debug!(path = %path.display(), "queueing new pdf");
                                if path_tx.send(path).await.is_err() {
                                    warn!("ingestion worker stopped, dropping event");
                                }
                            }
                        }
                        Err(watch_error) => {
                            warn!(error = %watch_error, "file watcher error");
                        }
                    }
                }
            }
        }

        drop(path_tx);
        if let Err(join_error) = worker.await {
            error!(error = %join_error, "ingestion worker panicked");
        }
        info!(folder = %self.folder.display(), "folder watcher stopped");
    }
}

/// PDF files announced by a create event or moved into the folder.
///
/// A rename inside the folder is reported as `To` and again as `Both`; only
/// `To` is taken so each arrival is queued once. Backends that cannot pair
/// rename halves report `Any`, where only the name that now exists counts.
pub fn arrived_pdfs(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => return Vec::new(),
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {}
        _ => return Vec::new(),
    }

    event
        .paths
        .iter()
        .filter(|path| is_pdf_path(path) && path.is_file())
        .cloned()
        .collect()
}

struct IngestWorker {
    pipeline: Arc<IngestionPipeline>,
    dead_letters: DeadLetterQueue,
    options: WatcherOptions,
}

impl IngestWorker {
    fn spawn(
        self,
        mut paths: mpsc::Receiver<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let path = tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                    next = paths.recv() => match next {
                        Some(path) => path,
                        None => break,
                    },
                };
                self.process(&path).await;
            }
            debug!("ingestion worker stopped");
        })
    }

    async fn process(&self, path: &Path) {
        if !path.exists() {
            warn!(path = %path.display(), "queued pdf no longer exists, skipping");
            return;
        }
        wait_until_settled(path, &self.options).await;

        let max_attempts = self.options.max_ingest_attempts;
        let mut attempt = 1;
        loop {
            match self.pipeline.ingest(path).await {
                Ok(report) => {
                    info!(
                        path = %path.display(),
                        index_id = %report.index_id,
                        documents = report.documents,
                        chunks = report.chunks,
                        "pdf ingested"
                    );
                    return;
                }
                Err(ingest_error) if ingest_error.is_transient() && attempt < max_attempts => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        path = %path.display(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %ingest_error,
                        "ingestion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(ingest_error) => {
                    error!(path = %path.display(), attempt, error = %ingest_error, "ingestion failed");
                    if !path.exists() {
                        return;
                    }
                    if let Err(record_error) =
                        self.dead_letters
                            .record(path, &ingest_error.to_string(), attempt)
                    {
                        error!(
                            path = %path.display(),
                            error = %record_error,
                            "could not write dead letter record"
                        );
                    }
                    return;
                }
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> std::time::Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.options.ingest_retry_delay.saturating_mul(factor)
    }
}

/// Waits until the file has a non-zero size that stays unchanged for one
/// settle interval, so half-copied uploads are not read.
async fn wait_until_settled(path: &Path, options: &WatcherOptions) {
    let started = Instant::now();
    let mut last_size = None;

    loop {
        let size = tokio::fs::metadata(path).await.ok().map(|meta| meta.len());
        match (last_size, size) {
            (_, None) => return,
            (Some(previous), Some(current)) if previous == current && current > 0 => return,
            _ => {}
        }
        if started.elapsed() >= options.settle_timeout {
            warn!(path = %path.display(), "pdf still changing after settle timeout, ingesting anyway");
            return;
        }
        last_size = size;
        tokio::time::sleep(options.settle_interval).await;
    }
}
