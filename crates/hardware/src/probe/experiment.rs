//! Experiments.
//!
//! Every experiment is the same pipeline with different address-pair
//! generators: pick addresses from an [`Arena`], hand them to the
//! [`Sampler`], optionally classify the medians. They are generic over
//! [`Instruments`] and run unchanged on hardware and on the simulated backend.

use serde::Serialize;
use tracing::info;

use crate::common::ProbeError;
use crate::config::{ProbeConfig, SamplerConfig};
use crate::memory::Arena;

use super::classifier::{Classification, classify};
use super::instruments::Instruments;
use super::pattern::Access;
use super::sampler::{Run, Sampler};
use super::scanner::{ScanResult, scan};

/// Label of the same-row pair.
pub const ROW_HIT: &str = "row-hit";
/// Label of the different-bank pair found by the scan.
pub const NO_CONFLICT: &str = "no-conflict";
/// Label of the same-bank, different-row pair found by the scan.
pub const ROW_CONFLICT: &str = "row-conflict";
/// Label of the fixed different-row pair.
pub const ROW_MISS: &str = "row-miss";

/// Outcome of [`row_policy`].
#[derive(Debug, Clone, Serialize)]
pub struct RowPolicyReport {
    /// Base offset A.
    pub base_offset: usize,
    /// A with A + `hit_offset`.
    pub hit: Run,
    /// A with the scan's minimum-latency candidate.
    pub no_conflict: Run,
    /// A with the scan's maximum-latency candidate.
    pub conflict: Run,
    /// The sweep that produced the two candidates.
    pub scan: ScanResult,
    /// Verdict and the medians behind it.
    pub classification: Classification,
    /// Clock ticks per nanosecond, when calibrated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles_per_ns: Option<f64>,
}

impl RowPolicyReport {
    /// The three runs in the order they are reported.
    pub fn runs(&self) -> [&Run; 3] {
        [&self.hit, &self.no_conflict, &self.conflict]
    }
}

/// Outcome of [`row_pair`].
#[derive(Debug, Clone, Serialize)]
pub struct RowPairReport {
    /// Base offset A.
    pub base_offset: usize,
    /// A with A + `hit_offset`.
    pub same_row: Run,
    /// A with A + `row_stride`.
    pub different_row: Run,
    /// Clock ticks per nanosecond, when calibrated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles_per_ns: Option<f64>,
}

/// Outcome of [`copy_sweep`].
#[derive(Debug, Clone, Serialize)]
pub struct CopySweepReport {
    /// One run per copy size, in sweep order.
    pub runs: Vec<CopyRun>,
    /// Clock ticks per nanosecond, when calibrated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles_per_ns: Option<f64>,
}

/// Block-copy latency of one size.
#[derive(Debug, Clone, Serialize)]
pub struct CopyRun {
    /// Bytes copied per trial.
    pub size: usize,
    /// The samples.
    #[serde(flatten)]
    pub run: Run,
}

/// Offset `delta` bytes past `base`, or out of bounds if the sum overflows.
fn partner_offset(arena: &Arena, base: usize, delta: usize) -> Result<usize, ProbeError> {
    base.checked_add(delta).ok_or(ProbeError::OutOfBounds {
        offset: base,
        len: delta,
        size: arena.len(),
    })
}

/// Runs the full row-policy pipeline: scan, measure the three pairs, classify.
///
/// # Errors
///
/// Any out-of-bounds offset, an empty scan window or a sampling failure.
pub fn row_policy<I: Instruments + ?Sized>(
    instruments: &mut I,
    arena: &Arena,
    config: &ProbeConfig,
) -> Result<RowPolicyReport, ProbeError> {
    let base_offset = config.scan.base_offset;
    info!(
        base_offset,
        arena = arena.len(),
        trials = config.sampler.trial_count,
        "starting row-policy experiment"
    );

    let mut sampler = Sampler::new(instruments, &config.sampler)?;
    let sweep = scan(&mut sampler, arena, &config.scan, config.arena.line_size)?;

    let base = arena.byte(base_offset)?;
    let mut measure_pair = |label: &str, offset: usize| -> Result<Run, ProbeError> {
        let candidate = arena.byte(offset)?;
        sampler.measure(label, &mut Access::chain(base, candidate))
    };

    let hit_offset = partner_offset(arena, base_offset, config.row.hit_offset)?;
    let hit = measure_pair(ROW_HIT, hit_offset)?;
    let no_conflict = measure_pair(NO_CONFLICT, sweep.min.offset)?;
    let conflict = measure_pair(ROW_CONFLICT, sweep.max.offset)?;

    let classification = classify(
        hit.median(),
        no_conflict.median(),
        conflict.median(),
        &config.classifier,
    );
    info!(
        verdict = %classification.verdict,
        hit = classification.hit,
        no_conflict = classification.no_conflict,
        conflict = classification.conflict,
        "row-policy experiment complete"
    );

    Ok(RowPolicyReport {
        base_offset,
        hit,
        no_conflict,
        conflict,
        scan: sweep,
        classification,
        cycles_per_ns: None,
    })
}

/// Times a same-row pair against a different-row pair at fixed offsets.
///
/// # Errors
///
/// Any out-of-bounds offset or a sampling failure.
pub fn row_pair<I: Instruments + ?Sized>(
    instruments: &mut I,
    arena: &Arena,
    config: &ProbeConfig,
) -> Result<RowPairReport, ProbeError> {
    let base_offset = config.scan.base_offset;
    info!(
        base_offset,
        hit_offset = config.row.hit_offset,
        row_stride = config.row.row_stride,
        "starting row-pair experiment"
    );

    let mut sampler = Sampler::new(instruments, &config.sampler)?;
    let base = arena.byte(base_offset)?;
    let same = arena.byte(partner_offset(arena, base_offset, config.row.hit_offset)?)?;
    let different = arena.byte(partner_offset(arena, base_offset, config.row.row_stride)?)?;

    let same_row = sampler.measure(ROW_HIT, &mut Access::chain(base, same))?;
    let different_row = sampler.measure(ROW_MISS, &mut Access::chain(base, different))?;

    info!(
        same_row = same_row.median(),
        different_row = different_row.median(),
        "row-pair experiment complete"
    );
    Ok(RowPairReport {
        base_offset,
        same_row,
        different_row,
        cycles_per_ns: None,
    })
}

/// Label of the copy run for `size` bytes.
pub fn copy_label(size: usize) -> String {
    format!("copy-{size}")
}

/// Times block copies of every configured size.
///
/// Source and destination are the two halves of one arena sized for the
/// largest copy; each size copies the leading `size` bytes of both halves.
///
/// # Errors
///
/// Allocation failure or a sampling failure.
pub fn copy_sweep<I: Instruments + ?Sized>(
    instruments: &mut I,
    config: &ProbeConfig,
) -> Result<CopySweepReport, ProbeError> {
    let max_size = config.copy_sweep.max_size();
    let mut arena = Arena::allocate(
        max_size * 2,
        config.arena.alignment,
        config.arena.fill_byte,
    )?;
    info!(
        sizes = config.copy_sweep.size_exponents.len(),
        max_size,
        trials = config.copy_sweep.trial_count,
        "starting copy sweep"
    );

    let sampler_config = SamplerConfig {
        trial_count: config.copy_sweep.trial_count,
        warmup_count: config.copy_sweep.warmup_count,
        ..config.sampler.clone()
    };
    let mut sampler = Sampler::new(instruments, &sampler_config)?;

    let (src, dst) = arena.as_mut_slice().split_at_mut(max_size);
    let mut runs = Vec::with_capacity(config.copy_sweep.size_exponents.len());
    for size in config.copy_sweep.sizes() {
        let mut access = Access::block_copy(&src[..size], &mut dst[..size])?;
        let run = sampler.measure(&copy_label(size), &mut access)?;
        runs.push(CopyRun { size, run });
    }

    info!(sizes = runs.len(), "copy sweep complete");
    Ok(CopySweepReport {
        runs,
        cycles_per_ns: None,
    })
}
