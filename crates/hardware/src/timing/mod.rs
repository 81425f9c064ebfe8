//! Hardware timing instruments.
//!
//! This module holds the two primitives that sit closest to the silicon:
//! 1. **Clock:** Serialized cycle-counter reads bounding a timed region.
//! 2. **Flush:** Cache-line invalidation establishing a cold precondition.
//!
//! The rest of the probe only sees the [`CycleClock`] and [`CacheInvalidator`]
//! traits, so it runs unchanged against the simulated backend.

/// Serialized cycle clock and calibration.
pub mod clock;

/// Cache-line invalidation.
pub mod flush;

pub use clock::{CycleClock, calibrate_cycles_per_ns};
pub use flush::{CacheInvalidator, line_span, lines_covered};

#[cfg(target_arch = "x86_64")]
pub use clock::{TscClock, tsc_is_invariant};
#[cfg(target_arch = "x86_64")]
pub use flush::ClflushInvalidator;
