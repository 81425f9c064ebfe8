//! Memory backing the probe.
//!
//! This module provides:
//! 1. **Arena:** Aligned, pre-faulted storage that every probe address is drawn from.
//! 2. **Controller:** DRAM latency models (fixed, row-buffer with page policy).
//! 3. **Sim:** A deterministic backend implementing the instrument traits over a controller model.

/// Aligned resident arena.
pub mod arena;

/// DRAM latency models.
pub mod controller;

/// Simulated cache/DRAM/clock backend.
pub mod sim;

pub use arena::{Arena, page_size};
pub use controller::{FixedLatency, MemoryController, RowBufferModel};
pub use sim::SimulatedMemory;
