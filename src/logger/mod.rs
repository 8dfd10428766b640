//! Activity logging: a dedicated writer thread owns the JSONL file; all other
//! threads send `ActivityEvent`s through a bounded crossbeam channel with a
//! non-blocking `try_send`, so scanning is never blocked by logging
//! back-pressure.

pub mod jsonl;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};

/// Bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events emitted by the scan and deletion engines.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    ScanCompleted {
        root: String,
        files_seen: u64,
        flagged: u64,
        duration_ms: u64,
    },
    FileDeleted {
        path: String,
        size_bytes: u64,
    },
    DeletionFailed {
        path: String,
        code: String,
        message: String,
    },
    AttributeResetFailed {
        path: String,
        message: String,
    },
    DeviceUnavailable {
        root: String,
    },
    CatalogSaved {
        path: String,
        rules: u64,
    },
    /// Sentinel requesting graceful shutdown of the writer thread.
    Shutdown,
}

impl ActivityEvent {
    fn to_entry(&self) -> Option<LogEntry> {
        match self {
            Self::ScanCompleted {
                root,
                files_seen,
                flagged,
                duration_ms,
            } => {
                let mut entry = LogEntry::now(EventType::ScanCompleted, Severity::Info);
                entry.path = Some(root.clone());
                entry.count = Some(*flagged);
                entry.files = Some(*files_seen);
                entry.duration_ms = Some(*duration_ms);
                Some(entry)
            }
            Self::FileDeleted { path, size_bytes } => {
                let mut entry = LogEntry::now(EventType::FileDeleted, Severity::Info);
                entry.path = Some(path.clone());
                entry.size = Some(*size_bytes);
                Some(entry)
            }
            Self::DeletionFailed {
                path,
                code,
                message,
            } => {
                let mut entry = LogEntry::now(EventType::DeletionFailed, Severity::Warning);
                entry.path = Some(path.clone());
                entry.code = Some(code.clone());
                entry.message = Some(message.clone());
                Some(entry)
            }
            Self::AttributeResetFailed { path, message } => {
                let mut entry = LogEntry::now(EventType::AttributeResetFailed, Severity::Warning);
                entry.path = Some(path.clone());
                entry.message = Some(message.clone());
                Some(entry)
            }
            Self::DeviceUnavailable { root } => {
                let mut entry = LogEntry::now(EventType::DeviceUnavailable, Severity::Warning);
                entry.path = Some(root.clone());
                Some(entry)
            }
            Self::CatalogSaved { path, rules } => {
                let mut entry = LogEntry::now(EventType::CatalogSaved, Severity::Info);
                entry.path = Some(path.clone());
                entry.count = Some(*rules);
                Some(entry)
            }
            Self::Shutdown => None,
        }
    }
}

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ActivityLoggerHandle {
    /// Send an event to the writer thread. Non-blocking: if the channel is
    /// full the event is dropped and counted.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown and wait for the writer thread to finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the writer thread. `path = None` logs to the stderr fallback only.
#[must_use]
pub fn start_activity_logger(path: Option<PathBuf>) -> ActivityLoggerHandle {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let writer = JsonlWriter::new(path);

    let join = std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            match event.to_entry() {
                Some(entry) => writer.append(&entry),
                None => break, // Shutdown sentinel.
            }
        }
    });

    ActivityLoggerHandle {
        tx,
        dropped_events: Arc::new(AtomicU64::new(0)),
        join: Arc::new(Mutex::new(Some(join))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn events_reach_the_log_file() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("activity.jsonl");
        let handle = start_activity_logger(Some(log.clone()));

        handle.send(ActivityEvent::ScanCompleted {
            root: "/media/usb".to_string(),
            files_seen: 40,
            flagged: 2,
            duration_ms: 17,
        });
        handle.send(ActivityEvent::FileDeleted {
            path: "/media/usb/a.exe".to_string(),
            size_bytes: 128,
        });
        handle.shutdown();

        let raw = std::fs::read_to_string(&log).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("scan_completed"));
        assert!(raw.contains("file_deleted"));
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let handle = start_activity_logger(None);
        handle.shutdown();
        handle.shutdown();
        // Sends after shutdown are silently ignored.
        handle.send(ActivityEvent::DeviceUnavailable {
            root: "/media/usb".to_string(),
        });
    }
}
