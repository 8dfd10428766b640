//! Scan engine: orchestrates normalize -> enumerate -> classify for a chosen
//! device and owns the resulting flagged-file collection.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::catalog::ExtensionCatalog;
use crate::core::errors::{Diagnostic, DiagnosticKind};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::platform::pal::{DriveHandle, DrivePlatform};
use crate::scanner::CancelToken;
use crate::scanner::classify::{FlaggedFileSet, classify};
use crate::scanner::{attributes, walker};

/// Counters for one scan pass.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub files_seen: usize,
    pub flagged: usize,
    pub attributes_reset: usize,
    pub duration: Duration,
}

/// The full result of one scan: the flagged set plus everything non-fatal
/// that went wrong along the way.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub drive_root: PathBuf,
    pub flagged: FlaggedFileSet,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ScanStats,
    pub cancelled: bool,
}

impl ScanReport {
    fn unavailable(root: &Path) -> Self {
        Self {
            drive_root: root.to_path_buf(),
            diagnostics: vec![Diagnostic::new(
                DiagnosticKind::DeviceUnavailable,
                root,
                "drive no longer resolves to a mounted volume",
            )],
            ..Self::default()
        }
    }
}

/// Synchronous scan orchestrator. Single-threaded by design; callers run it
/// on a background worker when a responsive UI sits on top. Each call to
/// [`ScanEngine::scan`] produces a fresh report that replaces any prior
/// flagged set the caller holds for that drive.
pub struct ScanEngine {
    platform: Arc<dyn DrivePlatform>,
    logger: Option<ActivityLoggerHandle>,
}

impl ScanEngine {
    #[must_use]
    pub fn new(platform: Arc<dyn DrivePlatform>, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { platform, logger }
    }

    /// Scan a removable device. An unavailable or stale handle is a no-op
    /// producing an empty flagged set and a `DeviceUnavailable` diagnostic,
    /// mirroring the quiet skip when no device is selected.
    pub fn scan(
        &self,
        drive: &DriveHandle,
        catalog: &ExtensionCatalog,
        cancel: &CancelToken,
    ) -> ScanReport {
        if !self.platform.is_available(drive) {
            self.log(ActivityEvent::DeviceUnavailable {
                root: drive.root.to_string_lossy().to_string(),
            });
            return ScanReport::unavailable(&drive.root);
        }
        self.scan_root(&drive.root, catalog, cancel)
    }

    /// Scan an explicit directory root. Used for rescans of paths the caller
    /// already validated, and by the CLI's `scan <ROOT>` form.
    pub fn scan_root(
        &self,
        root: &Path,
        catalog: &ExtensionCatalog,
        cancel: &CancelToken,
    ) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport {
            drive_root: root.to_path_buf(),
            ..ScanReport::default()
        };

        // Attribute reset is a precondition for visibility: without it,
        // hidden/read-only droppers could dodge traversal or survive
        // deletion.
        let attr = attributes::normalize(root);
        report.stats.attributes_reset = attr.files_reset + attr.dirs_reset;
        for diag in &attr.diagnostics {
            self.log(ActivityEvent::AttributeResetFailed {
                path: diag.path.to_string_lossy().to_string(),
                message: diag.message.clone(),
            });
        }
        report.diagnostics.extend(attr.diagnostics);

        let walk = walker::enumerate(root, cancel);
        report.stats.files_seen = walk.files.len();
        report.cancelled = walk.cancelled;
        report.diagnostics.extend(walk.diagnostics);

        report.flagged = classify(walk.files, catalog);
        report.stats.flagged = report.flagged.len();
        report.stats.duration = start.elapsed();

        self.log(ActivityEvent::ScanCompleted {
            root: root.to_string_lossy().to_string(),
            files_seen: report.stats.files_seen as u64,
            flagged: report.stats.flagged as u64,
            duration_ms: u64::try_from(report.stats.duration.as_millis()).unwrap_or(u64::MAX),
        });

        report
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{ExtensionCatalog, ExtensionRule};
    use crate::platform::pal::MockPlatform;
    use std::fs;
    use tempfile::TempDir;

    fn stock_catalog() -> ExtensionCatalog {
        ExtensionCatalog::from_rules(
            ExtensionCatalog::stock_rules(),
            PathBuf::from("settings.conf"),
        )
    }

    fn engine_for(tmp: &TempDir) -> (ScanEngine, DriveHandle) {
        let platform = Arc::new(MockPlatform::single_removable(tmp.path()));
        let drive = platform.volumes().unwrap().remove(0);
        (ScanEngine::new(platform, None), drive)
    }

    #[test]
    fn flags_exactly_the_dangerous_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.exe"), b"MZ").unwrap();
        fs::write(tmp.path().join("b.txt"), b"notes").unwrap();
        fs::write(tmp.path().join("c.lnk"), b"lnk").unwrap();

        let catalog = ExtensionCatalog::from_rules(
            vec![
                ExtensionRule::new(".exe", "").unwrap(),
                ExtensionRule::new(".lnk", "").unwrap(),
            ],
            PathBuf::from("settings.conf"),
        );

        let (engine, drive) = engine_for(&tmp);
        let report = engine.scan(&drive, &catalog, &CancelToken::new());

        assert_eq!(report.stats.files_seen, 3);
        assert_eq!(report.stats.flagged, 2);
        assert!(report.flagged.contains(&tmp.path().join("a.exe")));
        assert!(report.flagged.contains(&tmp.path().join("c.lnk")));
        assert!(!report.flagged.contains(&tmp.path().join("b.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn hidden_readonly_dropper_is_discovered_and_flagged() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let hidden = tmp.path().join(".autorun");
        fs::create_dir(&hidden).unwrap();
        let dropper = hidden.join("virus.exe");
        fs::write(&dropper, b"MZ").unwrap();
        fs::set_permissions(&dropper, fs::Permissions::from_mode(0o444)).unwrap();

        let (engine, drive) = engine_for(&tmp);
        let report = engine.scan(&drive, &stock_catalog(), &CancelToken::new());

        assert!(report.flagged.contains(&dropper));
        assert!(report.stats.attributes_reset >= 1);
        // Normalization made it deletable.
        let mode = fs::metadata(&dropper).unwrap().permissions().mode();
        assert_eq!(mode & 0o600, 0o600);
    }

    #[test]
    fn unavailable_drive_is_a_soft_no_op() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.exe"), b"MZ").unwrap();

        let platform = Arc::new(MockPlatform::single_removable(tmp.path()));
        let drive = platform.volumes().unwrap().remove(0);
        platform.unplug(tmp.path());

        let engine = ScanEngine::new(platform, None);
        let report = engine.scan(&drive, &stock_catalog(), &CancelToken::new());

        assert!(report.flagged.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::DeviceUnavailable);
    }

    #[test]
    fn rescan_replaces_the_prior_result() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.exe"), b"MZ").unwrap();

        let (engine, drive) = engine_for(&tmp);
        let catalog = stock_catalog();

        let first = engine.scan(&drive, &catalog, &CancelToken::new());
        assert_eq!(first.stats.flagged, 1);

        fs::remove_file(tmp.path().join("a.exe")).unwrap();
        fs::write(tmp.path().join("z.bat"), b"@echo off").unwrap();

        let second = engine.scan(&drive, &catalog, &CancelToken::new());
        assert_eq!(second.stats.flagged, 1);
        assert!(second.flagged.contains(&tmp.path().join("z.bat")));
        assert!(!second.flagged.contains(&tmp.path().join("a.exe")));
    }

    #[test]
    fn cancelled_scan_reports_cancellation() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.exe"), b"MZ").unwrap();

        let (engine, drive) = engine_for(&tmp);
        let token = CancelToken::new();
        token.cancel();
        let report = engine.scan(&drive, &stock_catalog(), &token);
        assert!(report.cancelled);
        assert!(report.flagged.is_empty());
    }
}
