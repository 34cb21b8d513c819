use crate::error::IngestError;
use crate::ingest::digest_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

pub const DEAD_LETTER_LOG: &str = "dead_letter.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterRecord {
    pub path: String,
    pub quarantined_path: Option<String>,
    pub checksum: Option<String>,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Quarantine for PDFs that cannot be ingested. Files are moved into the
/// directory and each failure is appended to `dead_letter.jsonl` there.
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    dir: PathBuf,
}

impl DeadLetterQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(DEAD_LETTER_LOG)
    }

    pub fn record(
        &self,
        path: &Path,
        reason: &str,
        attempts: u32,
    ) -> Result<DeadLetterRecord, IngestError> {
        fs::create_dir_all(&self.dir)?;

        let checksum = digest_file(path).ok();
        let quarantined = self.quarantine(path);

        let record = DeadLetterRecord {
            path: path.to_string_lossy().to_string(),
            quarantined_path: quarantined
                .as_ref()
                .map(|moved| moved.to_string_lossy().to_string()),
            checksum,
            reason: reason.to_string(),
            attempts,
            failed_at: Utc::now(),
        };

        let line = serde_json::to_string(&record)
            .map_err(|error| IngestError::InvalidArgument(error.to_string()))?;
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(log, "{line}")?;

        error!(
            path = %record.path,
            attempts,
            reason,
            "pdf moved to dead letter queue"
        );
        Ok(record)
    }

    pub fn records(&self) -> Result<Vec<DeadLetterRecord>, IngestError> {
        let log_path = self.log_path();
        if !log_path.exists() {
            return Ok(Vec::new());
        }

        fs::read_to_string(log_path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|error| IngestError::InvalidArgument(error.to_string()))
            })
            .collect()
    }

    fn quarantine(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        if !path.exists() {
            return None;
        }

        let mut target = self.dir.join(name);
        if target.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
            target = self.dir.join(format!("{stamp}-{}", name.to_string_lossy()));
        }

        match fs::rename(path, &target) {
            Ok(()) => Some(target),
            Err(rename_error) => {
                error!(path = %path.display(), error = %rename_error, "could not quarantine pdf");
                None
            }
        }
    }
}
