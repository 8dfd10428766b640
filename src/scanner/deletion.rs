//! Deletion engine: removes flagged files while keeping the in-memory set
//! consistent with the filesystem.
//!
//! Every file deletion is independent: one locked or permission-denied file
//! must not prevent attempts on the rest. A record leaves the flagged set
//! exactly when its file leaves the disk; failures stay in the set so the
//! caller can retry or report them.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::errors::{Diagnostic, DiagnosticKind, Result, UswError};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::CancelToken;
use crate::scanner::classify::FlaggedFileSet;
use crate::scanner::walker::FileRecord;

/// Extension of Windows shell shortcuts, the classic autorun decoy.
pub const SHORTCUT_EXTENSION: &str = ".lnk";

/// Deletion behavior knobs.
#[derive(Debug, Clone, Default)]
pub struct DeletionConfig {
    /// Report what would be deleted without touching disk or the set.
    pub dry_run: bool,
}

/// Summary of one deletion pass.
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<Diagnostic>,
    pub bytes_freed: u64,
    pub dry_run: bool,
    pub cancelled: bool,
}

/// Removes flagged files from disk and from the flagged set together.
pub struct DeletionEngine {
    config: DeletionConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl DeletionEngine {
    #[must_use]
    pub fn new(config: DeletionConfig, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { config, logger }
    }

    /// Delete every `.lnk` member. Non-shortcut members are left untouched.
    pub fn delete_shortcuts(
        &self,
        set: &mut FlaggedFileSet,
        cancel: &CancelToken,
    ) -> DeletionReport {
        self.delete_matching(set, cancel, |record| {
            record.extension == SHORTCUT_EXTENSION
        })
    }

    /// Delete exactly the chosen members. Chosen paths not present in the set
    /// are ignored.
    pub fn delete_selected(
        &self,
        set: &mut FlaggedFileSet,
        chosen: &[PathBuf],
        cancel: &CancelToken,
    ) -> DeletionReport {
        let chosen: HashSet<&Path> = chosen.iter().map(PathBuf::as_path).collect();
        self.delete_matching(set, cancel, |record| chosen.contains(record.path.as_path()))
    }

    /// Delete every member, emptying the set when everything succeeds.
    pub fn delete_all(&self, set: &mut FlaggedFileSet, cancel: &CancelToken) -> DeletionReport {
        self.delete_matching(set, cancel, |_| true)
    }

    fn delete_matching(
        &self,
        set: &mut FlaggedFileSet,
        cancel: &CancelToken,
        matches: impl Fn(&FileRecord) -> bool,
    ) -> DeletionReport {
        let mut report = DeletionReport {
            dry_run: self.config.dry_run,
            ..DeletionReport::default()
        };

        let targets: Vec<FileRecord> = set.iter().filter(|r| matches(r)).cloned().collect();
        for record in targets {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if self.config.dry_run {
                report.deleted.push(record.path.clone());
                report.bytes_freed += record.size_bytes;
                continue;
            }

            match delete_file(&record.path) {
                Ok(()) => {
                    set.remove(&record.path);
                    report.deleted.push(record.path.clone());
                    report.bytes_freed += record.size_bytes;
                    self.log(ActivityEvent::FileDeleted {
                        path: record.path.to_string_lossy().to_string(),
                        size_bytes: record.size_bytes,
                    });
                }
                Err(err) if matches!(&err, UswError::Io { source, .. }
                    if source.kind() == std::io::ErrorKind::NotFound) =>
                {
                    // The file vanished out from under us. It is gone from
                    // disk, so keeping the record would orphan the set; drop
                    // it and note what happened.
                    set.remove(&record.path);
                    report.failures.push(Diagnostic::new(
                        DiagnosticKind::DeletionFailed,
                        &record.path,
                        "file no longer exists on disk",
                    ));
                }
                Err(err) => {
                    report.failures.push(Diagnostic::new(
                        DiagnosticKind::DeletionFailed,
                        &record.path,
                        err.to_string(),
                    ));
                    self.log(ActivityEvent::DeletionFailed {
                        path: record.path.to_string_lossy().to_string(),
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        report
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn delete_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| UswError::io(path, e))?;

    // Post-deletion verification: the path should be gone.
    if path.exists() {
        return Err(UswError::Runtime {
            details: format!("path still exists after deletion: {}", path.display()),
        });
    }
    Ok(())
}

/// Runs `op` and pairs the report with its wall-clock duration.
pub fn timed<F>(op: F) -> (DeletionReport, Duration)
where
    F: FnOnce() -> DeletionReport,
{
    let start = Instant::now();
    let report = op();
    (report, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> DeletionEngine {
        DeletionEngine::new(DeletionConfig::default(), None)
    }

    fn flag_files(dir: &Path, names: &[&str]) -> FlaggedFileSet {
        let mut set = FlaggedFileSet::new();
        for name in names {
            let path = dir.join(name);
            fs::write(&path, b"payload").unwrap();
            set.insert(FileRecord::new(path, 7));
        }
        set
    }

    #[test]
    fn delete_all_empties_set_and_disk() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "b.bat", "c.lnk"]);

        let report = engine().delete_all(&mut set, &CancelToken::new());
        assert_eq!(report.deleted.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.bytes_freed, 21);
        assert!(set.is_empty());
        for name in ["a.exe", "b.bat", "c.lnk"] {
            assert!(!tmp.path().join(name).exists());
        }
    }

    #[test]
    fn delete_shortcuts_touches_only_lnk_members() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "c.lnk", "d.lnk"]);

        let report = engine().delete_shortcuts(&mut set, &CancelToken::new());
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&tmp.path().join("a.exe")));
        assert!(tmp.path().join("a.exe").exists());
        assert!(!tmp.path().join("c.lnk").exists());
    }

    #[test]
    fn delete_selected_ignores_non_members() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "b.bat"]);

        let chosen = vec![
            tmp.path().join("a.exe"),
            tmp.path().join("not-flagged.exe"),
        ];
        let report = engine().delete_selected(&mut set, &chosen, &CancelToken::new());
        assert_eq!(report.deleted, vec![tmp.path().join("a.exe")]);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&tmp.path().join("b.bat")));
    }

    #[test]
    fn failed_deletions_stay_in_the_set() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["good.exe"]);

        // A directory posing as a record: remove_file fails with EISDIR-ish
        // errors on every platform, giving a deterministic failure.
        let stubborn = tmp.path().join("locked.exe");
        fs::create_dir(&stubborn).unwrap();
        set.insert(FileRecord::new(stubborn.clone(), 0));

        let report = engine().delete_all(&mut set, &CancelToken::new());
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, DiagnosticKind::DeletionFailed);
        assert!(stubborn.exists(), "failed file must remain on disk");
        assert!(set.contains(&stubborn), "failed file must remain in the set");
        assert!(!set.contains(&tmp.path().join("good.exe")));
    }

    #[test]
    fn vanished_file_is_dropped_from_set_with_diagnostic() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["gone.exe"]);
        fs::remove_file(tmp.path().join("gone.exe")).unwrap();

        let report = engine().delete_all(&mut set, &CancelToken::new());
        assert!(report.deleted.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(set.is_empty(), "a file gone from disk must not stay in the set");
    }

    #[test]
    fn dry_run_leaves_disk_and_set_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "c.lnk"]);

        let engine = DeletionEngine::new(DeletionConfig { dry_run: true }, None);
        let report = engine.delete_all(&mut set, &CancelToken::new());
        assert!(report.dry_run);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(set.len(), 2);
        assert!(tmp.path().join("a.exe").exists());
    }

    #[test]
    fn timed_pairs_the_report_with_its_duration() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "c.lnk"]);

        let deleter = engine();
        let (report, elapsed) = timed(|| deleter.delete_all(&mut set, &CancelToken::new()));
        assert_eq!(report.deleted.len(), 2);
        assert!(set.is_empty());
        assert!(elapsed < Duration::from_secs(60));
    }

    #[test]
    fn cancellation_stops_between_files_without_corruption() {
        let tmp = TempDir::new().unwrap();
        let mut set = flag_files(tmp.path(), &["a.exe", "b.exe", "c.exe"]);

        let token = CancelToken::new();
        token.cancel();
        let report = engine().delete_all(&mut set, &token);
        assert!(report.cancelled);
        assert!(report.deleted.is_empty());
        assert_eq!(set.len(), 3);
        // Every member still pairs with a file on disk.
        for record in &set {
            assert!(record.path.exists());
        }
    }
}
