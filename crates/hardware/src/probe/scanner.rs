//! Address-space scanner.
//!
//! Sweeps candidate offsets B across the arena at a fixed stride, times the
//! A->B->A chain for each, and keeps the offsets with the lowest and highest
//! median. The lowest is taken as "different bank" relative to A and the
//! highest as "same bank, different row". The address-to-bank mapping is
//! undocumented and vendor specific, so this is an inference, not an
//! identification.

use serde::Serialize;
use tracing::{info, trace};

use crate::common::{MeasurementError, ProbeError};
use crate::config::ScanConfig;
use crate::memory::Arena;
use crate::stats::Aggregate;

use super::instruments::Instruments;
use super::pattern::Access;
use super::sampler::Sampler;

/// One sampled candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanPoint {
    /// Candidate offset from the arena start.
    pub offset: usize,
    /// Statistics of the A->B->A chain for this candidate.
    pub aggregate: Aggregate,
}

/// An extremal candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extreme {
    /// Candidate offset from the arena start.
    pub offset: usize,
    /// Its median in cycles.
    pub median: u64,
}

/// All sampled candidates with their minimum- and maximum-median members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    /// Fixed base offset A.
    pub base_offset: usize,
    /// Candidate with the lowest median (first seen on ties).
    pub min: Extreme,
    /// Candidate with the highest median (first seen on ties).
    pub max: Extreme,
    /// Every candidate in sweep order.
    #[serde(skip)]
    pub points: Vec<ScanPoint>,
}

impl ScanResult {
    /// Selects the extremes of `points`. Returns `None` if `points` is empty.
    ///
    /// Strict comparisons keep the first-seen candidate on ties.
    pub fn from_points(base_offset: usize, points: Vec<ScanPoint>) -> Option<Self> {
        let first = points.first()?;
        let mut min = Extreme {
            offset: first.offset,
            median: first.aggregate.median,
        };
        let mut max = min;

        for point in &points[1..] {
            let median = point.aggregate.median;
            if median < min.median {
                min = Extreme {
                    offset: point.offset,
                    median,
                };
            }
            if median > max.median {
                max = Extreme {
                    offset: point.offset,
                    median,
                };
            }
        }

        Some(Self {
            base_offset,
            min,
            max,
            points,
        })
    }

    /// Spread between the slowest and fastest candidate.
    pub const fn spread(&self) -> u64 {
        self.max.median - self.min.median
    }
}

/// Candidate offsets of `scan` inside an arena of `arena_len` bytes.
///
/// Candidates start at `start_offset`, step by `stride`, stop before the
/// window end, must leave room for a full line, and skip the line holding
/// the base address itself.
pub fn candidate_offsets(
    scan: &ScanConfig,
    arena_len: usize,
    line_size: usize,
) -> impl Iterator<Item = usize> + use<> {
    let end = scan.end_for(arena_len).min(arena_len);
    let base_line = scan.base_offset / line_size;
    let stride = scan.stride.max(1);
    (scan.start_offset..end)
        .step_by(stride)
        .filter(move |&off| off + line_size <= arena_len && off / line_size != base_line)
}

/// Sweeps the candidates of `scan` and returns the extremal offsets.
///
/// # Errors
///
/// [`MeasurementError::EmptySweep`] if the window holds no candidate;
/// [`ProbeError::OutOfBounds`] if the base lies outside the arena; any
/// sampling error.
pub fn scan<I: Instruments + ?Sized>(
    sampler: &mut Sampler<'_, I>,
    arena: &Arena,
    scan: &ScanConfig,
    line_size: usize,
) -> Result<ScanResult, ProbeError> {
    let base = arena.byte(scan.base_offset)?;
    let mut points = Vec::new();

    for offset in candidate_offsets(scan, arena.len(), line_size) {
        let candidate = arena.byte(offset)?;
        let run = sampler.measure("scan", &mut Access::chain(base, candidate))?;
        trace!(offset, median = run.median(), "scan point");
        points.push(ScanPoint {
            offset,
            aggregate: run.aggregate,
        });
    }

    let result = ScanResult::from_points(scan.base_offset, points).ok_or(
        MeasurementError::EmptySweep {
            start: scan.start_offset,
            end: scan.end_for(arena.len()),
            stride: scan.stride,
        },
    )?;

    info!(
        candidates = result.points.len(),
        min_offset = result.min.offset,
        min_median = result.min.median,
        max_offset = result.max.offset,
        max_median = result.max.median,
        "scan complete"
    );
    Ok(result)
}
