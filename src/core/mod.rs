//! Core types: errors, the persisted extension catalog.

pub mod catalog;
pub mod errors;
