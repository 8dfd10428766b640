#![forbid(unsafe_code)]

//! usbsweep — removable-media threat scanner.
//!
//! Watches for removable drives, sweeps them for files whose extensions match
//! a user-maintained catalog of dangerous types, and deletes the flagged
//! files while keeping the on-disk state and the in-memory set consistent.
//!
//! The pipeline per drive: attribute normalization (so hidden and read-only
//! payloads cannot dodge the sweep), recursive enumeration, extension
//! classification, then optional deletion of links only, a chosen subset, or
//! everything flagged.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use usbsweep::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use usbsweep::core::catalog::ExtensionCatalog;
//! use usbsweep::scanner::engine::ScanEngine;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod platform;
pub mod scanner;
