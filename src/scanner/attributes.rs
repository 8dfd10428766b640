//! Attribute normalizer: strips write-protection from a directory subtree so
//! enumeration and deletion are not silently blocked.
//!
//! USB malware routinely marks its droppers hidden/system/read-only to evade
//! casual inspection and resist removal. Normalization runs before
//! classification: every file and directory under the root has its read-only
//! bit cleared (on Unix, owner write and directory traverse bits restored),
//! except a fixed allow-list of OS-reserved directories. Per-path failures
//! are collected as diagnostics and never abort the walk.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{Diagnostic, DiagnosticKind};

/// Directory names owned by the host OS that normalization must not touch.
pub const RESERVED_DIRS: &[&str] = &[
    "System Volume Information",
    "$RECYCLE.BIN",
    ".Trashes",
    ".Spotlight-V100",
    "lost+found",
];

/// Result of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct AttributeReport {
    pub files_reset: usize,
    pub dirs_reset: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Recursively reset attributes under `root` to a normal, writable state.
#[must_use]
pub fn normalize(root: &Path) -> AttributeReport {
    let mut report = AttributeReport::default();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                report.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::AttributeResetFailed,
                    &dir,
                    err.to_string(),
                ));
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }

            if file_type.is_dir() {
                if is_reserved(&path) {
                    continue;
                }
                match reset_one(&path, true) {
                    Ok(changed) => report.dirs_reset += usize::from(changed),
                    Err(err) => report.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::AttributeResetFailed,
                        &path,
                        err.to_string(),
                    )),
                }
                stack.push(path);
            } else if file_type.is_file() {
                match reset_one(&path, false) {
                    Ok(changed) => report.files_reset += usize::from(changed),
                    Err(err) => report.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::AttributeResetFailed,
                        &path,
                        err.to_string(),
                    )),
                }
            }
        }
    }

    report
}

fn is_reserved(path: &Path) -> bool {
    path.file_name()
        .map(|name| RESERVED_DIRS.iter().any(|reserved| name == *reserved))
        .unwrap_or(false)
}

/// Clear write-protection on one path. Returns whether anything changed.
fn reset_one(path: &Path, is_dir: bool) -> std::io::Result<bool> {
    let metadata = fs::symlink_metadata(path)?;
    let mut permissions = metadata.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        // Owner write for files; owner rwx for directories so their children
        // stay reachable and removable.
        let wanted = if is_dir { mode | 0o700 } else { mode | 0o600 };
        if wanted == mode {
            return Ok(false);
        }
        permissions.set_mode(wanted);
    }
    #[cfg(not(unix))]
    {
        let _ = is_dir;
        if !permissions.readonly() {
            return Ok(false);
        }
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }

    fs::set_permissions(path, permissions)?;
    Ok(true)
}
