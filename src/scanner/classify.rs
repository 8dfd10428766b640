//! Threat classifier: matches enumerated files against the extension catalog.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::catalog::ExtensionCatalog;
use crate::scanner::walker::FileRecord;

/// The current scan result for one drive: files the caller has agreed to
/// treat as dangerous.
///
/// Invariant: every member existed on disk at classification time, and a
/// member leaves the set exactly when its file leaves the disk. The deletion
/// engine maintains this; cancellation mid-delete never breaks it.
#[derive(Debug, Clone, Default)]
pub struct FlaggedFileSet {
    records: Vec<FileRecord>,
    paths: HashSet<PathBuf>,
}

impl FlaggedFileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, ignoring duplicates by path. Multiple matching rules
    /// therefore never duplicate a file.
    pub fn insert(&mut self, record: FileRecord) -> bool {
        if self.paths.insert(record.path.clone()) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    /// Remove the record for `path`, if present.
    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        if !self.paths.remove(path) {
            return None;
        }
        let index = self.records.iter().position(|r| r.path == path)?;
        Some(self.records.remove(index))
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    #[must_use]
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a FlaggedFileSet {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Flag every file whose extension exactly equals at least one rule pattern.
/// Case-sensitive, as the host filesystem reports extensions.
#[must_use]
pub fn classify(files: Vec<FileRecord>, catalog: &ExtensionCatalog) -> FlaggedFileSet {
    let mut flagged = FlaggedFileSet::new();
    for file in files {
        if catalog.matches(&file.extension) {
            flagged.insert(file);
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ExtensionRule;
    use proptest::prelude::*;

    fn catalog_of(patterns: &[&str]) -> ExtensionCatalog {
        let rules = patterns
            .iter()
            .map(|p| ExtensionRule {
                pattern: (*p).to_string(),
                description: String::new(),
            })
            .collect();
        ExtensionCatalog::from_rules(rules, PathBuf::from("settings.conf"))
    }

    fn record(path: &str) -> FileRecord {
        FileRecord::new(PathBuf::from(path), 0)
    }

    #[test]
    fn flags_exactly_the_matching_extensions() {
        let catalog = catalog_of(&[".exe", ".lnk"]);
        let files = vec![
            record("/mnt/usb/a.exe"),
            record("/mnt/usb/b.txt"),
            record("/mnt/usb/c.lnk"),
            record("/mnt/usb/noext"),
        ];

        let flagged = classify(files, &catalog);
        assert_eq!(flagged.len(), 2);
        assert!(flagged.contains(Path::new("/mnt/usb/a.exe")));
        assert!(flagged.contains(Path::new("/mnt/usb/c.lnk")));
    }

    #[test]
    fn duplicate_rules_do_not_duplicate_files() {
        let catalog = catalog_of(&[".exe", ".exe", ".exe"]);
        let flagged = classify(vec![record("/mnt/usb/a.exe")], &catalog);
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let catalog = catalog_of(&[".exe"]);
        let flagged = classify(
            vec![record("/mnt/usb/UPPER.EXE"), record("/mnt/usb/lower.exe")],
            &catalog,
        );
        assert_eq!(flagged.len(), 1);
        assert!(flagged.contains(Path::new("/mnt/usb/lower.exe")));
    }

    #[test]
    fn empty_catalog_flags_nothing() {
        let catalog = catalog_of(&[]);
        let flagged = classify(vec![record("/mnt/usb/a.exe")], &catalog);
        assert!(flagged.is_empty());
    }

    #[test]
    fn set_remove_keeps_membership_consistent() {
        let catalog = catalog_of(&[".exe", ".lnk"]);
        let mut flagged = classify(
            vec![record("/mnt/usb/a.exe"), record("/mnt/usb/c.lnk")],
            &catalog,
        );

        let removed = flagged.remove(Path::new("/mnt/usb/a.exe")).unwrap();
        assert_eq!(removed.extension, ".exe");
        assert!(!flagged.contains(Path::new("/mnt/usb/a.exe")));
        assert_eq!(flagged.len(), 1);
        assert!(flagged.remove(Path::new("/mnt/usb/a.exe")).is_none());
    }

    proptest! {
        // A file is flagged iff at least one rule's pattern equals its
        // extension, for arbitrary catalogs (duplicates included).
        #[test]
        fn flagged_iff_some_rule_matches(
            patterns in proptest::collection::vec("\\.[a-z]{1,4}", 0..8),
            names in proptest::collection::vec("[a-z]{1,6}\\.[a-z]{1,4}", 0..16),
        ) {
            let catalog = catalog_of(&patterns.iter().map(String::as_str).collect::<Vec<_>>());
            let files: Vec<FileRecord> = names
                .iter()
                .map(|n| FileRecord::new(PathBuf::from(format!("/mnt/usb/{n}")), 0))
                .collect();

            let flagged = classify(files.clone(), &catalog);
            for file in &files {
                let expected = patterns.iter().any(|p| *p == file.extension);
                prop_assert_eq!(
                    flagged.contains(&file.path),
                    expected,
                    "file {:?} ext {:?}",
                    &file.path,
                    &file.extension
                );
            }
        }
    }
}
