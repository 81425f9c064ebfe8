//! Sample sets and robust aggregation.
//!
//! This module turns raw cycle deltas into the statistics every comparison
//! downstream relies on. It provides:
//! 1. **SampleSet:** A non-empty collection of deltas kept both in trial order
//!    (for output) and sorted (for order statistics).
//! 2. **Aggregate:** The median plus min, max, mean and anomaly count of one set.
//! 3. **median:** The upper median of an arbitrary slice.
//!
//! The median is the canonical estimate: interrupts, SMIs and TLB stalls add a
//! long right tail that drags a mean upward but barely moves the median.

use serde::Serialize;

/// Upper median (`sorted[len / 2]`) of `samples`, or `None` if empty.
///
/// Independent of input order.
pub fn median(samples: &[u64]) -> Option<u64> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied()
}

/// Non-empty set of valid cycle deltas for one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSet {
    raw: Vec<u64>,
    sorted: Vec<u64>,
    anomalies: usize,
}

impl SampleSet {
    /// Builds a set from deltas in trial order. Returns `None` if `raw` is empty.
    ///
    /// `anomalies` counts deltas that were discarded before reaching `raw`.
    pub fn new(raw: Vec<u64>, anomalies: usize) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        let mut sorted = raw.clone();
        sorted.sort_unstable();
        Some(Self {
            raw,
            sorted,
            anomalies,
        })
    }

    /// Number of valid samples.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Always `false`; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Samples in the order they were taken.
    pub fn raw(&self) -> &[u64] {
        &self.raw
    }

    /// Samples in ascending order.
    pub fn sorted(&self) -> &[u64] {
        &self.sorted
    }

    /// Deltas discarded as anomalous while filling the set.
    pub const fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Upper median.
    pub fn median(&self) -> u64 {
        self.sorted[self.sorted.len() / 2]
    }

    /// Smallest sample.
    pub fn min(&self) -> u64 {
        self.sorted[0]
    }

    /// Largest sample.
    pub fn max(&self) -> u64 {
        self.sorted[self.sorted.len() - 1]
    }

    /// Arithmetic mean. Reported for context only.
    pub fn mean(&self) -> f64 {
        self.raw.iter().map(|&x| x as f64).sum::<f64>() / self.raw.len() as f64
    }

    /// Nearest-rank percentile for `p` in `[0, 1]` (clamped).
    pub fn percentile(&self, p: f64) -> u64 {
        let p = p.clamp(0.0, 1.0);
        let idx = ((self.sorted.len() - 1) as f64 * p).round() as usize;
        self.sorted[idx]
    }

    /// Summary statistics of the set.
    pub fn aggregate(&self) -> Aggregate {
        Aggregate {
            median: self.median(),
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            count: self.len(),
            anomalies: self.anomalies,
        }
    }
}

/// Summary of one [`SampleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    /// Upper median in cycles.
    pub median: u64,
    /// Fastest sample.
    pub min: u64,
    /// Slowest sample.
    pub max: u64,
    /// Mean, for context.
    pub mean: f64,
    /// Valid samples.
    pub count: usize,
    /// Discarded anomalous samples.
    pub anomalies: usize,
}
