//! Memory-subsystem latency probe library.
//!
//! This crate measures DRAM access latency from user space and infers the
//! memory controller's row-buffer page policy. It provides:
//! 1. **Timing:** Serialized cycle-counter reads and cache-line invalidation.
//! 2. **Memory:** An aligned, pre-faulted arena and a deterministic simulated backend.
//! 3. **Probe:** Access patterns, the trial sampler, the address scanner, the classifier and experiments.
//! 4. **Stats:** Sample sets and median-based aggregation.
//! 5. **Report:** CSV, plain-text and JSON output of experiment results.

/// Common types and constants (granularity, errors, output format).
pub mod common;
/// Probe configuration (defaults, sections, loading, validation).
pub mod config;
/// Arena, DRAM controller models and the simulated backend.
pub mod memory;
/// Measurement pipeline (instruments, patterns, sampler, scanner, classifier, experiments).
pub mod probe;
/// Result sinks and summaries.
pub mod report;
/// Sample sets and aggregate statistics.
pub mod stats;
/// Cycle clock and cache invalidation.
pub mod timing;

/// Root configuration type; use `ProbeConfig::default()` or load it from JSON.
pub use crate::config::ProbeConfig;
/// Top-level error type.
pub use crate::common::ProbeError;
/// Aligned resident arena every probe address is drawn from.
pub use crate::memory::Arena;
/// Deterministic backend implementing every instrument trait.
pub use crate::memory::SimulatedMemory;
/// Page-policy verdict.
pub use crate::probe::Verdict;
