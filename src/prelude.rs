//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use usbsweep::prelude::*;
//! ```

// Core
pub use crate::core::catalog::{ExtensionCatalog, ExtensionRule};
pub use crate::core::errors::{Diagnostic, DiagnosticKind, Result, UswError};

// Platform
pub use crate::platform::pal::{
    DriveHandle, DrivePlatform, VolumeKind, detect_platform, list_removable_devices,
};

// Scanner
pub use crate::scanner::CancelToken;
pub use crate::scanner::classify::FlaggedFileSet;
pub use crate::scanner::deletion::{DeletionConfig, DeletionEngine, DeletionReport};
pub use crate::scanner::engine::{ScanEngine, ScanReport, ScanStats};
pub use crate::scanner::walker::FileRecord;

// Logger
pub use crate::logger::{ActivityEvent, ActivityLoggerHandle, start_activity_logger};
