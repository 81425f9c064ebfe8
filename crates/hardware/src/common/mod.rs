//! Common types and constants used throughout the probe.
//!
//! This module provides the building blocks shared by every component:
//! 1. **Constants:** Cache-line and page granularity, size units, CSV headers.
//! 2. **Error Handling:** Setup and measurement error taxonomies.

/// Probe-wide constants.
pub mod constants;

/// Error types for setup and measurement failures.
pub mod error;

pub use constants::{CACHE_LINE, KIB, MIB, PAGE_SIZE};
pub use error::{ConfigError, MeasurementError, ProbeError};
