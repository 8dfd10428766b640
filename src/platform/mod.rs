//! Platform abstraction layer for device enumeration.

pub mod pal;
