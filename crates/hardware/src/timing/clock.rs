//! Serialized cycle clock.
//!
//! This module bounds timed regions. It provides:
//! 1. **`CycleClock`:** The begin/end contract every clock implementation honours.
//! 2. **`TscClock`:** `rdtscp` fenced by `lfence` (and optionally `cpuid`) on x86_64.
//! 3. **Calibration:** Cycles-per-nanosecond estimation against the OS monotonic clock.
//!
//! `begin` must not let later instructions start before the counter is sampled;
//! `end` must not sample the counter before earlier memory accesses complete.

use std::thread;
use std::time::{Duration, Instant};

#[cfg(target_arch = "x86_64")]
use std::sync::atomic::{Ordering, compiler_fence};

#[cfg(target_arch = "x86_64")]
use crate::common::ProbeError;
#[cfg(target_arch = "x86_64")]
use crate::config::Serialization;

/// A monotonic cycle counter read with serialization at both ends of a timed region.
pub trait CycleClock {
    /// Samples the counter at the start of a timed region.
    fn begin(&mut self) -> u64;

    /// Samples the counter at the end of a timed region.
    fn end(&mut self) -> u64;
}

/// Time-stamp counter clock.
///
/// Requires an invariant TSC for the counts to be comparable across trials;
/// [`tsc_is_invariant`] reports whether the host advertises one.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    serialization: Serialization,
}

#[cfg(target_arch = "x86_64")]
impl TscClock {
    /// Creates a clock with the given serialization strength.
    ///
    /// Fails with [`ProbeError::UnsupportedPlatform`] if the CPU lacks `rdtscp`.
    pub fn new(serialization: Serialization) -> Result<Self, ProbeError> {
        if !std::arch::is_x86_feature_detected!("sse2") || !has_rdtscp() {
            return Err(ProbeError::UnsupportedPlatform);
        }
        Ok(Self { serialization })
    }

    /// The serialization strength used by both reads.
    pub const fn serialization(&self) -> Serialization {
        self.serialization
    }
}

#[cfg(target_arch = "x86_64")]
impl CycleClock for TscClock {
    #[inline(always)]
    fn begin(&mut self) -> u64 {
        use std::arch::x86_64::{__cpuid, __rdtscp, _mm_lfence};

        compiler_fence(Ordering::SeqCst);
        let mut aux = 0u32;
        // SAFETY: `new` verified rdtscp and sse2 support; `aux` is a valid
        // out-pointer for the duration of the call.
        let t = unsafe {
            if self.serialization == Serialization::Full {
                let _ = __cpuid(0);
            }
            _mm_lfence();
            let t = __rdtscp(&raw mut aux);
            _mm_lfence();
            t
        };
        compiler_fence(Ordering::SeqCst);
        t
    }

    #[inline(always)]
    fn end(&mut self) -> u64 {
        use std::arch::x86_64::{__cpuid, __rdtscp, _mm_lfence};

        compiler_fence(Ordering::SeqCst);
        let mut aux = 0u32;
        // SAFETY: as in `begin`.
        let t = unsafe {
            let t = __rdtscp(&raw mut aux);
            _mm_lfence();
            if self.serialization == Serialization::Full {
                let _ = __cpuid(0);
            }
            t
        };
        compiler_fence(Ordering::SeqCst);
        t
    }
}

/// CPUID.80000001H:EDX[27] advertises `rdtscp`.
#[cfg(target_arch = "x86_64")]
fn has_rdtscp() -> bool {
    use std::arch::x86_64::__cpuid;

    // SAFETY: cpuid is available on every x86_64 CPU.
    let max_ext = unsafe { __cpuid(0x8000_0000) }.eax;
    if max_ext < 0x8000_0001 {
        return false;
    }
    // SAFETY: leaf checked against the maximum extended leaf above.
    let edx = unsafe { __cpuid(0x8000_0001) }.edx;
    edx & (1 << 27) != 0
}

/// Returns `true` if CPUID.80000007H:EDX[8] (invariant TSC) is set.
///
/// Without it the counter may stop in deep C-states or scale with frequency,
/// which shifts samples but rarely flips a verdict.
#[cfg(target_arch = "x86_64")]
pub fn tsc_is_invariant() -> bool {
    use std::arch::x86_64::__cpuid;

    // SAFETY: cpuid is available on every x86_64 CPU.
    let max_ext = unsafe { __cpuid(0x8000_0000) }.eax;
    if max_ext < 0x8000_0007 {
        return false;
    }
    // SAFETY: leaf checked against the maximum extended leaf above.
    let edx = unsafe { __cpuid(0x8000_0007) }.edx;
    edx & (1 << 8) != 0
}

/// Estimates how many clock ticks elapse per nanosecond of wall time.
///
/// Sleeps `interval` between paired reads `rounds` times and returns the
/// median ratio, or `None` if no round produced a usable measurement
/// (e.g. a clock that does not advance with wall time).
pub fn calibrate_cycles_per_ns<C: CycleClock + ?Sized>(
    clock: &mut C,
    rounds: usize,
    interval: Duration,
) -> Option<f64> {
    let mut ratios = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let start_cycles = clock.begin();
        let start = Instant::now();
        thread::sleep(interval);
        let end_cycles = clock.end();
        let elapsed_ns = start.elapsed().as_nanos() as u64;

        let Some(cycles) = end_cycles.checked_sub(start_cycles) else {
            continue;
        };
        if elapsed_ns == 0 || cycles == 0 {
            continue;
        }
        ratios.push(cycles as f64 / elapsed_ns as f64);
    }

    ratios.sort_by(f64::total_cmp);
    ratios.get(ratios.len() / 2).copied()
}
