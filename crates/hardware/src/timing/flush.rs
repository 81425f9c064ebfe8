//! Cache-line invalidation.
//!
//! Every timed trial starts from a known-cold state: the lines it will touch
//! are evicted from all cache levels first, so the access under test is
//! served by DRAM.

use std::ops::Range;

/// Evicts address ranges from every cache level visible to the core.
pub trait CacheInvalidator {
    /// Evicts every line overlapping `region` and waits until the eviction is
    /// globally visible. Must not modify the bytes.
    fn invalidate(&mut self, region: &[u8]);
}

/// Rounds `[addr, addr + len)` outward to whole lines of `line` bytes.
///
/// An empty range yields an empty span. `line` must be a power of two.
pub const fn line_span(addr: usize, len: usize, line: usize) -> Range<usize> {
    if len == 0 {
        return addr..addr;
    }
    let mask = line - 1;
    let start = addr & !mask;
    let end = (addr + len + mask) & !mask;
    start..end
}

/// Number of lines covered by [`line_span`].
pub const fn lines_covered(addr: usize, len: usize, line: usize) -> usize {
    let span = line_span(addr, len, line);
    (span.end - span.start) / line
}

/// `clflush` over each line followed by `mfence`.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct ClflushInvalidator {
    line_size: usize,
}

#[cfg(target_arch = "x86_64")]
impl ClflushInvalidator {
    /// Creates an invalidator flushing at `line_size` granularity (power of two).
    pub const fn new(line_size: usize) -> Self {
        Self { line_size }
    }
}

#[cfg(target_arch = "x86_64")]
impl CacheInvalidator for ClflushInvalidator {
    #[inline]
    fn invalidate(&mut self, region: &[u8]) {
        use std::arch::x86_64::{_mm_clflush, _mm_mfence};

        let span = line_span(region.as_ptr() as usize, region.len(), self.line_size);
        for line in span.step_by(self.line_size) {
            // SAFETY: each line start lies in the same page as a byte of
            // `region`, so the address is mapped. clflush never writes data.
            unsafe { _mm_clflush(line as *const u8) };
        }
        // SAFETY: sse2 is part of the x86_64 baseline.
        unsafe { _mm_mfence() };
    }
}
