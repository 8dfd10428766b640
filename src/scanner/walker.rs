//! Recursive file walker: enumerates every regular file under a root.
//!
//! Depth-first with an explicit stack, so nesting depth is unbounded without
//! risking stack overflow. Symlinks are never followed; as extra protection
//! against loops through bind mounts or hostile media, each directory's
//! `(device, inode)` pair is visited at most once on Unix. Unreadable
//! subtrees are skipped and reported as diagnostics, never raised.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Diagnostic, DiagnosticKind};
use crate::scanner::CancelToken;

/// A concrete file discovered on a device. Owned by the flagged set until
/// deleted or the scan is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Extension including the leading dot (`.exe`), exactly as the
    /// filesystem reports it. Empty for files without an extension.
    pub extension: String,
    pub size_bytes: u64,
}

impl FileRecord {
    #[must_use]
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        let extension = extension_of(&path);
        Self {
            path,
            extension,
            size_bytes,
        }
    }
}

/// Extension of `path` with its leading dot, or an empty string.
/// No case normalization is performed; matching is exact-string.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Result of one enumeration pass.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    pub files: Vec<FileRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub cancelled: bool,
}

/// Collect every regular file reachable by recursive descent under `root`.
///
/// Ordering is not contractual; callers must not depend on it. Per-directory
/// errors are accumulated as diagnostics and do not abort the walk.
#[must_use]
pub fn enumerate(root: &Path, cancel: &CancelToken) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut visited_dirs: HashSet<(u64, u64)> = HashSet::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        if let Some(id) = dir_identity(&dir)
            && !visited_dirs.insert(id)
        {
            continue;
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                outcome.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::EnumerationFailed,
                    &dir,
                    err.to_string(),
                ));
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    outcome.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::EnumerationFailed,
                        &dir,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            let Ok(file_type) = entry.file_type() else {
                outcome.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::EnumerationFailed,
                    entry.path(),
                    "could not determine file type".to_string(),
                ));
                continue;
            };

            // Symlinks are skipped outright: following them could walk off
            // the device or loop forever through a crafted cycle.
            if file_type.is_symlink() {
                continue;
            }

            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                outcome.files.push(FileRecord::new(entry.path(), size_bytes));
            }
            // Sockets, FIFOs, device nodes: not regular files, not collected.
        }
    }

    outcome
}

#[cfg(unix)]
fn dir_identity(dir: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    fs::symlink_metadata(dir).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn dir_identity(_dir: &Path) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    fn found_paths(outcome: &WalkOutcome) -> HashSet<PathBuf> {
        outcome.files.iter().map(|f| f.path.clone()).collect()
    }

    #[test]
    fn finds_files_at_every_depth() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a").join("b").join("c").join("d");
        fs::create_dir_all(&deep).unwrap();
        touch(&tmp.path().join("top.exe"));
        touch(&tmp.path().join("a").join("mid.txt"));
        touch(&deep.join("bottom.lnk"));

        let outcome = enumerate(tmp.path(), &CancelToken::new());
        let paths = found_paths(&outcome);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&deep.join("bottom.lnk")));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn records_extension_and_size() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("dropper.exe"), b"MZ....").unwrap();
        touch(&tmp.path().join("README"));

        let outcome = enumerate(tmp.path(), &CancelToken::new());
        let dropper = outcome
            .files
            .iter()
            .find(|f| f.path.ends_with("dropper.exe"))
            .unwrap();
        assert_eq!(dropper.extension, ".exe");
        assert_eq!(dropper.size_bytes, 6);

        let readme = outcome
            .files
            .iter()
            .find(|f| f.path.ends_with("README"))
            .unwrap();
        assert_eq!(readme.extension, "");
    }

    #[test]
    fn dot_directories_are_traversed() {
        let tmp = TempDir::new().unwrap();
        let hidden = tmp.path().join(".hidden");
        fs::create_dir(&hidden).unwrap();
        touch(&hidden.join("virus.exe"));

        let outcome = enumerate(tmp.path(), &CancelToken::new());
        assert!(found_paths(&outcome).contains(&hidden.join("virus.exe")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        touch(&real.join("payload.exe"));
        std::os::unix::fs::symlink(&real, tmp.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(real.join("payload.exe"), tmp.path().join("alias.exe")).unwrap();

        let outcome = enumerate(tmp.path(), &CancelToken::new());
        let paths = found_paths(&outcome);
        assert!(paths.contains(&real.join("payload.exe")));
        assert!(!paths.contains(&tmp.path().join("alias.exe")));
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn unreadable_root_yields_diagnostic_not_panic() {
        let outcome = enumerate(Path::new("/definitely/does/not/exist"), &CancelToken::new());
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::EnumerationFailed
        );
    }

    #[test]
    fn cancelled_token_stops_the_walk() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a.exe"));

        let token = CancelToken::new();
        token.cancel();
        let outcome = enumerate(tmp.path(), &token);
        assert!(outcome.cancelled);
        assert!(outcome.files.is_empty());
    }

    #[test]
    fn enumeration_is_order_invariant_as_a_set() {
        let tmp = TempDir::new().unwrap();
        for name in ["1.exe", "2.bat", "3.lnk", "4.txt"] {
            touch(&tmp.path().join(name));
        }

        let first = found_paths(&enumerate(tmp.path(), &CancelToken::new()));
        let second = found_paths(&enumerate(tmp.path(), &CancelToken::new()));
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }
}
