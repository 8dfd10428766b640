//! USW-prefixed error types with structured error codes, plus the diagnostic
//! record used for per-path non-fatal failures.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, UswError>;

/// Top-level error type for usbsweep.
///
/// Only conditions that abort an operation live here. Device loss and
/// per-path failures during bulk operations travel as [`Diagnostic`] records
/// inside the operation's report instead.
#[derive(Debug, Error)]
pub enum UswError {
    #[error("[USW-1001] invalid extension rule: {details}")]
    InvalidRule { details: String },

    #[error("[USW-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[USW-2001] catalog load failure at {}: {details}", path.display())]
    CatalogLoad { path: PathBuf, details: String },

    #[error("[USW-2002] catalog save failure at {}: {details}", path.display())]
    CatalogSave { path: PathBuf, details: String },

    #[error("[USW-3002] IO failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[USW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl UswError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRule { .. } => "USW-1001",
            Self::UnsupportedPlatform { .. } => "USW-1101",
            Self::CatalogLoad { .. } => "USW-2001",
            Self::CatalogSave { .. } => "USW-2002",
            Self::Io { .. } => "USW-3002",
            Self::Runtime { .. } => "USW-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Runtime { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Category of a per-path non-fatal failure collected during a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    AttributeResetFailed,
    EnumerationFailed,
    DeletionFailed,
    DeviceUnavailable,
}

/// One per-path failure record.
///
/// Bulk operations (normalize, enumerate, delete) accumulate these instead of
/// aborting: a single locked or permission-denied file on removable media must
/// not block cleanup of everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: PathBuf,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}
