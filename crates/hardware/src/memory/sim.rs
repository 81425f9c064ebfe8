//! Simulated memory backend.
//!
//! `SimulatedMemory` implements all three instrument traits over a virtual
//! cycle counter, a line-granular cache and a [`MemoryController`] model:
//! - `invalidate` drops lines from the cache,
//! - `load`/`copy` charge a cache-hit latency for resident lines and the
//!   controller's DRAM latency (then install the line) for the rest,
//! - `begin`/`end` read the virtual counter, `begin` adding the fixed timer
//!   overhead.
//!
//! Latencies depend only on the sequence of addresses touched, so every
//! experiment run against it is reproducible.

use std::collections::HashSet;

use crate::common::ProbeError;
use crate::config::SimulationConfig;
use crate::probe::MemoryPort;
use crate::timing::{CacheInvalidator, CycleClock, line_span};

use super::controller::{MemoryController, RowBufferModel};

/// Deterministic stand-in for the cache hierarchy, DRAM and cycle counter.
#[derive(Debug, Clone)]
pub struct SimulatedMemory<C = RowBufferModel> {
    controller: C,
    cached: HashSet<usize>,
    line_size: usize,
    cache_hit: u64,
    timer_overhead: u64,
    now: u64,
    dram_accesses: u64,
}

impl SimulatedMemory<RowBufferModel> {
    /// Builds a backend over a [`RowBufferModel`] described by `config`.
    pub fn new(config: &SimulationConfig, line_size: usize) -> Result<Self, ProbeError> {
        let controller = RowBufferModel::new(config)?;
        Ok(Self::with_controller(
            controller,
            line_size,
            config.cache_hit,
            config.timer_overhead,
        ))
    }
}

impl<C: MemoryController> SimulatedMemory<C> {
    /// Builds a backend over an arbitrary controller model.
    ///
    /// # Arguments
    ///
    /// * `controller` - DRAM model charged for every uncached line.
    /// * `line_size` - Cache-line size in bytes.
    /// * `cache_hit` - Cycles charged for a load that hits a cached line.
    /// * `timer_overhead` - Cycles added to every `begin`/`end` interval.
    ///
    /// # Returns
    ///
    /// A backend with an empty cache and the counter at zero.
    pub fn with_controller(controller: C, line_size: usize, cache_hit: u64, timer_overhead: u64) -> Self {
        Self {
            controller,
            cached: HashSet::new(),
            line_size,
            cache_hit,
            timer_overhead,
            now: 0,
            dram_accesses: 0,
        }
    }

    /// The controller model.
    pub const fn controller(&self) -> &C {
        &self.controller
    }

    /// Current value of the virtual counter.
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Accesses that reached DRAM so far.
    pub const fn dram_accesses(&self) -> u64 {
        self.dram_accesses
    }

    /// Returns `true` if the line containing `addr` is cached.
    pub fn is_cached(&self, addr: usize) -> bool {
        self.cached.contains(&(addr / self.line_size))
    }

    /// Charges one access to every line overlapping `region`.
    fn touch(&mut self, region: &[u8]) {
        let span = line_span(region.as_ptr() as usize, region.len(), self.line_size);
        for line_addr in span.step_by(self.line_size) {
            let line = line_addr / self.line_size;
            let cost = if self.cached.insert(line) {
                self.dram_accesses += 1;
                self.controller.access_latency(line_addr as u64)
            } else {
                self.cache_hit
            };
            self.now += cost;
        }
    }
}

impl<C: MemoryController> CycleClock for SimulatedMemory<C> {
    fn begin(&mut self) -> u64 {
        let t = self.now;
        self.now += self.timer_overhead;
        t
    }

    fn end(&mut self) -> u64 {
        self.now
    }
}

impl<C: MemoryController> CacheInvalidator for SimulatedMemory<C> {
    fn invalidate(&mut self, region: &[u8]) {
        let span = line_span(region.as_ptr() as usize, region.len(), self.line_size);
        for line_addr in span.step_by(self.line_size) {
            let _ = self.cached.remove(&(line_addr / self.line_size));
        }
    }
}

impl<C: MemoryController> MemoryPort for SimulatedMemory<C> {
    fn load(&mut self, byte: &u8) -> u8 {
        self.touch(std::slice::from_ref(byte));
        *byte
    }

    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        self.touch(src);
        self.touch(dst);
        dst.copy_from_slice(src);
    }
}
