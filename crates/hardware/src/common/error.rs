//! Probe error definitions.
//!
//! Errors fall into two families that callers must be able to tell apart:
//! 1. **Setup errors:** Allocation, alignment, bounds, platform and configuration
//!    problems. The experiment cannot start; there is nothing to retry.
//! 2. **Measurement errors:** The run started but the instrument could not
//!    produce a trustworthy sample set (too many anomalous deltas, empty sweep).
//!
//! Individual anomalous samples are not errors; the sampler discards and counts them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type returned by every fallible probe operation.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The operating system refused to provide the arena.
    #[error("failed to allocate a {size}-byte arena aligned to {alignment} bytes: {source}")]
    Allocation {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        alignment: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Alignment is not a power of two or is smaller than a cache line.
    #[error("invalid alignment {0}: must be a power of two and at least one cache line")]
    InvalidAlignment(usize),

    /// A probe address would fall outside the arena.
    #[error("range at offset {offset:#x} (+{len}) lies outside the {size}-byte arena")]
    OutOfBounds {
        /// Offset of the requested range.
        offset: usize,
        /// Length of the requested range.
        len: usize,
        /// Arena size in bytes.
        size: usize,
    },

    /// The host lacks a serialized cycle counter or a cache-line flush instruction.
    #[error("cycle counter and cache-line flush are only available on x86_64 hosts")]
    UnsupportedPlatform,

    /// The configuration was rejected before any allocation took place.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sampling could not produce a valid sample set.
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}

impl ProbeError {
    /// Returns `true` for setup errors that abort the run before any measurement.
    ///
    /// Measurement errors return `false`: the instrument worked but the
    /// signal did not meet the quality bar.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Measurement(_))
    }
}

/// Configuration rejected by [`ProbeConfig::validate`](crate::config::ProbeConfig::validate)
/// or by the loaders.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Fewer than two timed trials; a median over one sample reduces no noise.
    #[error("trial count {0} is too small: at least 2 timed trials are required for a median")]
    TrialCount(usize),

    /// Scan stride of zero.
    #[error("scan stride must be non-zero")]
    Stride,

    /// Scan window is empty or exceeds the arena.
    #[error("scan window [{start:#x}, {end:#x}) is empty or outside the {arena}-byte arena")]
    ScanRange {
        /// First candidate offset.
        start: usize,
        /// End of the window (exclusive).
        end: usize,
        /// Arena size in bytes.
        arena: usize,
    },

    /// The scan window holds no candidate once the base line is skipped.
    #[error("scan window [{start:#x}, {end:#x}) with stride {stride} has no candidate besides the base line")]
    NoCandidates {
        /// First candidate offset.
        start: usize,
        /// End of the window (exclusive).
        end: usize,
        /// Step between candidates.
        stride: usize,
    },

    /// The hit partner lies in the base's cache line and would time a cache hit.
    #[error("hit offset {offset} keeps the pair inside one {line}-byte cache line")]
    HitOffset {
        /// Rejected hit offset.
        offset: usize,
        /// Cache-line size in bytes.
        line: usize,
    },

    /// The plausibility window accepts no delta.
    #[error("plausible range [{min}, {max}] cycles is empty")]
    PlausibleRange {
        /// Smallest accepted delta.
        min: u64,
        /// Largest accepted delta.
        max: u64,
    },

    /// A fixed probe offset does not fit in the arena.
    #[error("{name} offset {offset:#x} does not fit in the {arena}-byte arena")]
    Offset {
        /// Which offset was rejected.
        name: &'static str,
        /// The rejected value.
        offset: usize,
        /// Arena size in bytes.
        arena: usize,
    },

    /// A classifier threshold or tolerance is not a positive finite number.
    #[error("threshold {name} = {value} must be positive and finite")]
    Threshold {
        /// Threshold name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// A simulated DRAM dimension is not a power of two.
    #[error("simulated {name} = {value} must be a non-zero power of two")]
    Geometry {
        /// Dimension name.
        name: &'static str,
        /// Rejected value.
        value: usize,
    },

    /// Copy sweep size exponent would overflow or is empty.
    #[error("copy sweep exponents {0:?} must be non-empty and below the pointer width")]
    SweepSizes(Vec<u32>),

    /// The trial-count override in the environment is not a number.
    #[error("environment override {var}={value:?} is not a valid trial count")]
    EnvOverride {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The configuration is not valid JSON for [`ProbeConfig`](crate::config::ProbeConfig).
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sampling failures.
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// Too many deltas were negative or implausible to fill the sample set.
    #[error(
        "{label}: collected {collected}/{requested} valid samples before the resample budget ran out ({anomalies} anomalies)"
    )]
    ResampleBudgetExhausted {
        /// Configuration label.
        label: String,
        /// Valid samples gathered.
        collected: usize,
        /// Samples requested.
        requested: usize,
        /// Anomalous samples discarded.
        anomalies: usize,
    },

    /// The scanner was asked to sweep a window containing no candidate.
    #[error("scan window [{start:#x}, {end:#x}) with stride {stride} contains no candidate offset")]
    EmptySweep {
        /// First candidate offset.
        start: usize,
        /// End of the window (exclusive).
        end: usize,
        /// Step between candidates.
        stride: usize,
    },
}
