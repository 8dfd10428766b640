//! Extension catalog: the user-maintained, ordered list of dangerous file
//! extensions, persisted as a versioned TOML document.
//!
//! The catalog lives at `settings.conf` relative to the working directory by
//! default. A missing file bootstraps the three stock rules (`.exe`, `.lnk`,
//! `.bat`) and saves immediately; a corrupt or unreadable file is a hard
//! error — silently proceeding with a partial rule set would look like the
//! user's rules were lost.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UswError};

/// Default catalog file name, resolved against the working directory.
pub const CATALOG_FILE_NAME: &str = "settings.conf";

/// On-disk format version. Bump when the document layout changes.
pub const CATALOG_FORMAT_VERSION: u32 = 1;

/// One extension rule: a pattern such as `.exe` plus a human-readable
/// description. Equality is exact string match on both fields; matching
/// against files uses only `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRule {
    pub pattern: String,
    pub description: String,
}

impl ExtensionRule {
    /// Build a validated rule. Patterns must start with a dot and contain no
    /// path separators; descriptions are free-form.
    pub fn new(pattern: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.starts_with('.') || pattern.len() < 2 {
            return Err(UswError::InvalidRule {
                details: format!("pattern {pattern:?} must start with '.' and name an extension"),
            });
        }
        if pattern.contains(['/', '\\']) {
            return Err(UswError::InvalidRule {
                details: format!("pattern {pattern:?} must not contain path separators"),
            });
        }
        Ok(Self {
            pattern,
            description: description.into(),
        })
    }
}

/// Serialized catalog document. Kept separate from the in-memory type so the
/// on-disk layout stays an explicit, versioned contract.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    version: u32,
    #[serde(default)]
    rules: Vec<ExtensionRule>,
}

/// Ordered collection of extension rules.
///
/// Order is insertion order and matters only for display. Duplicates are
/// tolerated; classification treats the catalog as "any rule matches".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCatalog {
    rules: Vec<ExtensionRule>,
    path: PathBuf,
}

impl ExtensionCatalog {
    /// Default persisted location: `settings.conf` in the working directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        env::current_dir().map_or_else(|_| PathBuf::from(CATALOG_FILE_NAME), |d| d.join(CATALOG_FILE_NAME))
    }

    /// Load the catalog from `path` (or the default location), bootstrapping
    /// the stock rules and saving immediately when no file exists yet.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        if path.exists() {
            Self::load(&path)
        } else {
            let catalog = Self {
                rules: Self::stock_rules(),
                path,
            };
            catalog.save()?;
            Ok(catalog)
        }
    }

    /// Load from an existing file. Parse failures and unknown format versions
    /// are hard errors; the engine never continues with a partial catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| UswError::CatalogLoad {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        let doc: CatalogDocument = toml::from_str(&raw).map_err(|err| UswError::CatalogLoad {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        if doc.version > CATALOG_FORMAT_VERSION {
            return Err(UswError::CatalogLoad {
                path: path.to_path_buf(),
                details: format!(
                    "unknown catalog format version {} (this build reads up to {})",
                    doc.version, CATALOG_FORMAT_VERSION
                ),
            });
        }
        Ok(Self {
            rules: doc.rules,
            path: path.to_path_buf(),
        })
    }

    /// Persist the catalog. Writes to a sibling temp file and renames so a
    /// crash mid-write cannot leave a truncated document behind.
    pub fn save(&self) -> Result<()> {
        let doc = CatalogDocument {
            version: CATALOG_FORMAT_VERSION,
            rules: self.rules.clone(),
        };
        let rendered = toml::to_string_pretty(&doc).map_err(|err| UswError::CatalogSave {
            path: self.path.clone(),
            details: err.to_string(),
        })?;

        let tmp = self.path.with_extension("conf.tmp");
        fs::write(&tmp, rendered.as_bytes()).map_err(|err| UswError::CatalogSave {
            path: tmp.clone(),
            details: err.to_string(),
        })?;
        fs::rename(&tmp, &self.path).map_err(|err| UswError::CatalogSave {
            path: self.path.clone(),
            details: err.to_string(),
        })
    }

    /// The three stock rules shipped on first run, matching the common
    /// payload of autorun-based USB malware.
    #[must_use]
    pub fn stock_rules() -> Vec<ExtensionRule> {
        vec![
            ExtensionRule {
                pattern: ".exe".to_string(),
                description: "Executable program".to_string(),
            },
            ExtensionRule {
                pattern: ".lnk".to_string(),
                description: "Windows shell shortcut".to_string(),
            },
            ExtensionRule {
                pattern: ".bat".to_string(),
                description: "Windows batch script".to_string(),
            },
        ]
    }

    #[must_use]
    pub fn rules(&self) -> &[ExtensionRule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when any rule's pattern exactly equals `extension`.
    /// Matching is case-sensitive, exactly as the filesystem reports names.
    #[must_use]
    pub fn matches(&self, extension: &str) -> bool {
        self.rules.iter().any(|rule| rule.pattern == extension)
    }

    /// Append a rule. Duplicates are tolerated. Returns the new rule list.
    pub fn add_rule(&mut self, rule: ExtensionRule) -> &[ExtensionRule] {
        self.rules.push(rule);
        &self.rules
    }

    /// Replace the rule at `index`. Returns the new rule list.
    pub fn edit_rule(&mut self, index: usize, rule: ExtensionRule) -> Result<&[ExtensionRule]> {
        let slot = self.rules.get_mut(index).ok_or_else(|| UswError::InvalidRule {
            details: format!("rule index {index} out of range"),
        })?;
        *slot = rule;
        Ok(&self.rules)
    }

    /// Remove and return the rule at `index`.
    pub fn remove_rule(&mut self, index: usize) -> Result<ExtensionRule> {
        if index >= self.rules.len() {
            return Err(UswError::InvalidRule {
                details: format!("rule index {index} out of range"),
            });
        }
        Ok(self.rules.remove(index))
    }

    /// Build an in-memory catalog without touching disk. Used by tests and by
    /// callers that manage persistence themselves.
    #[must_use]
    pub fn from_rules(rules: Vec<ExtensionRule>, path: PathBuf) -> Self {
        Self { rules, path }
    }
}
