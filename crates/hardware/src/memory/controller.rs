//! Memory controller latency models.
//!
//! This module provides:
//! 1. **FixedLatency:** Every DRAM access costs the same (no row buffer).
//! 2. **RowBufferModel:** Banked DRAM with an open- or closed-page policy and
//!    XOR bank hashing, charging CAS, activate and precharge latencies.
//!
//! The models back [`SimulatedMemory`](super::sim::SimulatedMemory), giving the
//! probe a deterministic target with a known answer.

use crate::common::{ConfigError, ProbeError};
use crate::config::{PagePolicy, SimulationConfig};

/// Reports the DRAM latency of an access that missed every cache level.
pub trait MemoryController {
    /// Returns the cycles needed to service an access to `addr`, updating
    /// any row-buffer state.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address of the accessed line; bank and row bits are decoded from it.
    ///
    /// # Returns
    ///
    /// DRAM latency in simulated cycles.
    fn access_latency(&mut self, addr: u64) -> u64;
}

/// Fixed-latency controller.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatency {
    latency: u64,
}

impl FixedLatency {
    /// Creates a controller charging `latency` cycles per access.
    pub const fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl MemoryController for FixedLatency {
    fn access_latency(&mut self, _addr: u64) -> u64 {
        self.latency
    }
}

/// Banked DRAM with per-bank row buffers.
///
/// Address bits below `log2(row_bytes)` select the column. The next
/// `log2(banks)` bits, XOR-folded with the bits above them, select the bank;
/// the remaining high bits select the row. Two addresses a multiple of
/// `row_bytes * banks` apart therefore share a bank only when their row
/// indices agree in the folded bits, as on real controllers.
#[derive(Debug, Clone)]
pub struct RowBufferModel {
    policy: PagePolicy,
    row_shift: u32,
    bank_bits: u32,
    open_rows: Vec<Option<u64>>,
    t_cas: u64,
    t_ras: u64,
    t_pre: u64,
}

impl RowBufferModel {
    /// Builds a model from the simulation section of the configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Row size, bank count, page policy and tCAS/tRAS/tRP timings.
    ///
    /// # Returns
    ///
    /// A model with every bank precharged (no open row).
    ///
    /// # Errors
    ///
    /// [`ConfigError::Geometry`] if `row_bytes` or `banks` is not a power of two.
    pub fn new(config: &SimulationConfig) -> Result<Self, ProbeError> {
        for (name, value) in [("row_bytes", config.row_bytes), ("banks", config.banks)] {
            if !value.is_power_of_two() {
                return Err(ConfigError::Geometry { name, value }.into());
            }
        }
        Ok(Self {
            policy: config.policy,
            row_shift: config.row_bytes.trailing_zeros(),
            bank_bits: config.banks.trailing_zeros(),
            open_rows: vec![None; config.banks],
            t_cas: config.t_cas,
            t_ras: config.t_ras,
            t_pre: config.t_pre,
        })
    }

    /// Bank that services `addr`.
    pub const fn bank_of(&self, addr: u64) -> usize {
        let r = addr >> self.row_shift;
        let mask = (1u64 << self.bank_bits) - 1;
        ((r ^ (r >> self.bank_bits)) & mask) as usize
    }

    /// Row index of `addr` within its bank.
    pub const fn row_of(&self, addr: u64) -> u64 {
        addr >> (self.row_shift + self.bank_bits)
    }

    /// The page policy being modelled.
    pub const fn policy(&self) -> PagePolicy {
        self.policy
    }

    /// Closes every row.
    pub fn precharge_all(&mut self) {
        self.open_rows.fill(None);
    }
}

impl MemoryController for RowBufferModel {
    fn access_latency(&mut self, addr: u64) -> u64 {
        let bank = self.bank_of(addr);
        let row = self.row_of(addr);

        match self.policy {
            PagePolicy::Closed => self.t_ras + self.t_cas,
            PagePolicy::Open => match self.open_rows[bank] {
                Some(open) if open == row => self.t_cas,
                Some(_) => {
                    self.open_rows[bank] = Some(row);
                    self.t_pre + self.t_ras + self.t_cas
                }
                None => {
                    self.open_rows[bank] = Some(row);
                    self.t_ras + self.t_cas
                }
            },
        }
    }
}
