//! Measurement pipeline.
//!
//! This module wires the instruments into experiments:
//! 1. **Instruments:** The clock/invalidator/port seam and its hardware implementation.
//! 2. **Pattern:** Access patterns and the executor that performs them.
//! 3. **Sampler:** Repeated cold-start trials reduced to aggregate statistics.
//! 4. **Scanner:** Stride sweep locating the fastest and slowest candidate offsets.
//! 5. **Classifier:** Threshold rule turning three medians into a page-policy verdict.
//! 6. **Experiment:** Row-policy, row-pair and copy-sweep drivers.

/// Row-buffer policy verdicts.
pub mod classifier;

/// Experiment drivers and their reports.
pub mod experiment;

/// Instrument traits and hardware instruments.
pub mod instruments;

/// Access patterns and executor.
pub mod pattern;

/// Trial sampler.
pub mod sampler;

/// Address-space scanner.
pub mod scanner;

pub use classifier::{Classification, Verdict, classify};
pub use experiment::{
    CopyRun, CopySweepReport, RowPairReport, RowPolicyReport, copy_sweep, row_pair, row_policy,
};
#[cfg(target_arch = "x86_64")]
pub use instruments::HardwareInstruments;
pub use instruments::{Instruments, MemoryPort, VolatilePort};
pub use pattern::{Access, Pattern, execute};
pub use sampler::{Run, Sampler};
pub use scanner::{Extreme, ScanPoint, ScanResult, candidate_offsets, scan};
