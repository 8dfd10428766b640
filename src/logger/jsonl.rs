//! JSONL activity log: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with a single `write_all` so a tailing process never sees a partial line.
//! Fallback chain: target file, then stderr with a `[USW-LOG]` prefix, then
//! silent discard — a scan must never fail because logging did.

#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event type identifiers matching the usbsweep activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ScanCompleted,
    FileDeleted,
    DeletionFailed,
    AttributeResetFailed,
    DeviceUnavailable,
    CatalogSaved,
    Error,
}

/// A single JSONL log entry; only `ts`, `event`, and `severity` are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogEntry {
    /// Entry stamped with the current UTC time and no optional fields.
    #[must_use]
    pub fn now(event: EventType, severity: Severity) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            event,
            severity,
            path: None,
            size: None,
            count: None,
            files: None,
            duration_ms: None,
            code: None,
            message: None,
        }
    }
}

/// Appends entries to a JSONL file, degrading to stderr and then to nothing.
#[derive(Debug)]
pub struct JsonlWriter {
    path: Option<PathBuf>,
}

impl JsonlWriter {
    /// `None` writes straight to the stderr fallback.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn append(&self, entry: &LogEntry) {
        let Ok(mut line) = serde_json::to_string(entry) else {
            return;
        };
        line.push('\n');

        if let Some(path) = &self.path
            && Self::append_to_file(path, &line)
        {
            return;
        }

        // Stderr fallback; ignore failure (fd may be closed in daemons).
        let _ = write!(std::io::stderr(), "[USW-LOG] {line}");
    }

    fn append_to_file(path: &PathBuf, line: &str) -> bool {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .is_ok()
    }
}
