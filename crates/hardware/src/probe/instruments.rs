//! Instrument seam between the measurement pipeline and the machine.
//!
//! The pipeline needs three capabilities: a serialized clock, a cache-line
//! invalidator and a way to touch memory that the optimizer cannot remove.
//! [`Instruments`] bundles them; [`HardwareInstruments`] provides them on
//! x86_64 and [`SimulatedMemory`](crate::memory::SimulatedMemory) provides
//! them deterministically everywhere.

use crate::timing::{CacheInvalidator, CycleClock};

#[cfg(target_arch = "x86_64")]
use tracing::{info, warn};

#[cfg(target_arch = "x86_64")]
use crate::common::ProbeError;
#[cfg(target_arch = "x86_64")]
use crate::config::{ProbeConfig, Serialization};
#[cfg(target_arch = "x86_64")]
use crate::timing::{ClflushInvalidator, TscClock, tsc_is_invariant};

/// Performs the memory operations of an access pattern.
pub trait MemoryPort {
    /// Reads `byte` in a way the compiler may neither elide nor reorder
    /// relative to other port operations.
    fn load(&mut self, byte: &u8) -> u8;

    /// Moves all of `src` into `dst` (equal lengths).
    fn copy(&mut self, dst: &mut [u8], src: &[u8]);
}

/// Everything a trial needs: clock, invalidator and memory port.
pub trait Instruments: CycleClock + CacheInvalidator + MemoryPort {}

impl<T: CycleClock + CacheInvalidator + MemoryPort + ?Sized> Instruments for T {}

/// Volatile loads and full-length copies, optionally load-fenced.
#[derive(Debug, Clone, Copy)]
pub struct VolatilePort {
    fence_between_loads: bool,
}

impl VolatilePort {
    /// Creates a port. With `fence_between_loads`, every load is followed by
    /// `lfence` so consecutive loads of a chain cannot overlap in the pipeline.
    pub const fn new(fence_between_loads: bool) -> Self {
        Self { fence_between_loads }
    }
}

impl MemoryPort for VolatilePort {
    #[inline(always)]
    fn load(&mut self, byte: &u8) -> u8 {
        // SAFETY: `byte` is a valid, aligned reference.
        let value = unsafe { std::ptr::read_volatile(byte) };
        if self.fence_between_loads {
            #[cfg(target_arch = "x86_64")]
            // SAFETY: sse2 is part of the x86_64 baseline.
            unsafe {
                std::arch::x86_64::_mm_lfence();
            }
        }
        value
    }

    #[inline(always)]
    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
        let _ = std::hint::black_box(&mut *dst);
    }
}

/// Real-hardware instruments: TSC clock, `clflush`, volatile port.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct HardwareInstruments {
    clock: TscClock,
    flusher: ClflushInvalidator,
    port: VolatilePort,
}

#[cfg(target_arch = "x86_64")]
impl HardwareInstruments {
    /// Builds the instruments described by the sampler and arena sections.
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let clock = TscClock::new(config.sampler.serialization)?;
        if !tsc_is_invariant() {
            warn!("CPU does not advertise an invariant TSC; cycle counts may drift with frequency");
        }
        info!(
            serialization = ?config.sampler.serialization,
            line_size = config.arena.line_size,
            "hardware instruments ready"
        );
        Ok(Self {
            clock,
            flusher: ClflushInvalidator::new(config.arena.line_size),
            port: VolatilePort::new(config.sampler.fence_between_loads),
        })
    }

    /// Serialization strength of the clock.
    pub const fn serialization(&self) -> Serialization {
        self.clock.serialization()
    }
}

#[cfg(target_arch = "x86_64")]
impl CycleClock for HardwareInstruments {
    #[inline(always)]
    fn begin(&mut self) -> u64 {
        self.clock.begin()
    }

    #[inline(always)]
    fn end(&mut self) -> u64 {
        self.clock.end()
    }
}

#[cfg(target_arch = "x86_64")]
impl CacheInvalidator for HardwareInstruments {
    #[inline]
    fn invalidate(&mut self, region: &[u8]) {
        self.flusher.invalidate(region);
    }
}

#[cfg(target_arch = "x86_64")]
impl MemoryPort for HardwareInstruments {
    #[inline(always)]
    fn load(&mut self, byte: &u8) -> u8 {
        self.port.load(byte)
    }

    #[inline(always)]
    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        self.port.copy(dst, src);
    }
}
