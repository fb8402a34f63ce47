//! Append-only error tracking.
//!
//! One JSON record per line; the file survives process restarts and
//! feeds recovery tooling. Writes are best-effort: a failure to log
//! never fails the ingestion path that produced the error.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// A single error record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub document_id: String,
    pub phase: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

/// Append-only JSONL error log.
pub struct ErrorLog {
    path: Option<PathBuf>,
    /// In-memory tail, also the only storage when no path is set.
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    /// A log that only keeps records in memory (tests, embedded use).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    /// A log that appends to the given file.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Record an error. Never fails; file problems are logged and
    /// swallowed.
    pub fn record(&self, document_id: &str, phase: &str, kind: ErrorKind, message: &str) {
        let record = ErrorRecord {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            phase: phase.to_string(),
            error_kind: kind,
            message: message.to_string(),
            timestamp: Utc::now(),
            retryable: kind.retryable(),
        };

        if let Some(path) = &self.path {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    let appended = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .and_then(|mut f| writeln!(f, "{line}"));
                    if let Err(e) = appended {
                        tracing::warn!(error = %e, "failed to append error record");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to serialize error record"),
            }
        }

        self.records.lock().unwrap().push(record);
    }

    /// Records seen by this process, oldest first.
    pub fn recent(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records for one document.
    pub fn for_document(&self, document_id: &str) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect()
    }
}
