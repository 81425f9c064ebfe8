//! Global Probe Constants.
//!
//! This module defines the fixed quantities shared across the probe. It includes:
//! 1. **Granularity Constants:** Cache-line and page sizes used for flushing and pre-faulting.
//! 2. **Size Constants:** Binary size multipliers used by the configuration defaults.
//! 3. **Output Constants:** Column names of the stable CSV result format.

/// Cache-line size in bytes assumed when the configuration does not override it.
///
/// `clflush` evicts exactly one line, so every flushed range is rounded to
/// this granularity.
pub const CACHE_LINE: usize = 64;

/// Page size in bytes assumed when the operating system cannot be queried.
pub const PAGE_SIZE: usize = 4096;

/// One kibibyte.
pub const KIB: usize = 1024;

/// One mebibyte.
pub const MIB: usize = 1024 * KIB;

/// Header row of a CSV stream keyed by transfer size.
pub const CSV_SIZE_HEADER: &str = "size,cycles";

/// Header row of a CSV stream keyed by configuration label.
pub const CSV_LABEL_HEADER: &str = "label,cycles";

/// Environment variable that overrides the number of timed trials per configuration.
pub const TRIAL_COUNT_ENV: &str = "ROWPROBE_TRIAL_COUNT";
