//! Configuration system for the probe.
//!
//! This module defines every tunable of an experiment. It provides:
//! 1. **Defaults:** Baseline constants (arena geometry, trial counts, scan window, thresholds).
//! 2. **Structures:** One section per component (arena, sampler, scan, row, classifier, copy sweep, simulation).
//! 3. **Enums:** Clock serialization strength and simulated page policy.
//! 4. **Loading:** JSON deserialization, the trial-count environment override, and validation.
//!
//! Every field has a default, so an empty JSON object is a complete configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::constants::TRIAL_COUNT_ENV;
use crate::common::{ConfigError, ProbeError};
use crate::probe::candidate_offsets;

/// Default configuration constants.
///
/// These values reproduce the reference experiment: a 256 MiB arena sampled
/// at 64 KiB strides, 200 timed A->B->A trials after 10 warm-up rounds.
mod defaults {
    use crate::common::constants::{CACHE_LINE, KIB, MIB};

    /// Cache-line size in bytes.
    pub const LINE_SIZE: usize = CACHE_LINE;

    /// Arena size (256 MiB), large enough that most of it lives only in DRAM.
    pub const ARENA_SIZE: usize = 256 * MIB;

    /// Arena base alignment (64 KiB).
    ///
    /// Keeps the low address bits that select column and bank identical
    /// between runs.
    pub const ARENA_ALIGNMENT: usize = 64 * KIB;

    /// Byte written across the arena before any timing.
    pub const FILL_BYTE: u8 = 0xA5;

    /// Timed trials per configuration.
    pub const TRIAL_COUNT: usize = 200;

    /// Untimed warm-up rounds per configuration.
    pub const WARMUP_COUNT: usize = 10;

    /// Smallest delta accepted as a real measurement.
    pub const MIN_PLAUSIBLE_CYCLES: u64 = 1;

    /// Largest delta accepted as a real measurement (~3 ms at 3 GHz).
    ///
    /// Anything above is a preemption, not a memory access.
    pub const MAX_PLAUSIBLE_CYCLES: u64 = 10_000_000;

    /// Anomalous deltas tolerated per configuration before giving up.
    pub const MAX_RESAMPLES: usize = 1_000;

    /// First candidate offset of the scan (64 KiB).
    pub const SCAN_START: usize = 64 * KIB;

    /// Step between scan candidates (64 KiB).
    pub const SCAN_STRIDE: usize = 64 * KIB;

    /// Same-row column offset guess (512 B).
    ///
    /// DDR4 rows span several KiB, so a few hundred bytes normally stays
    /// in the row already opened by the base address.
    pub const HIT_OFFSET: usize = 512;

    /// Presumed row size used by the fixed-offset row-pair experiment (8 KiB).
    pub const ROW_STRIDE: usize = 8 * KIB;

    /// Open-row margin k1.
    pub const OPEN_MARGIN: f64 = 1.5;

    /// Hit vs no-conflict tolerance epsilon1.
    pub const HIT_TOLERANCE: f64 = 0.1;

    /// Conflict vs hit tolerance epsilon2.
    pub const CONFLICT_TOLERANCE: f64 = 0.2;

    /// Copy sizes as powers of two: 64 B through 64 KiB, then 1 MiB and 2 MiB.
    pub const COPY_EXPONENTS: [u32; 13] = [6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 20, 21];

    /// Timed copies per size.
    pub const COPY_TRIAL_COUNT: usize = 1_000;

    /// Simulated DRAM row size (8 KiB).
    pub const SIM_ROW_BYTES: usize = 8 * KIB;

    /// Simulated bank count.
    pub const SIM_BANKS: usize = 8;

    /// Simulated CAS latency in cycles.
    pub const SIM_T_CAS: u64 = 14;

    /// Simulated RAS (activate) latency in cycles.
    pub const SIM_T_RAS: u64 = 14;

    /// Simulated precharge latency in cycles.
    pub const SIM_T_PRE: u64 = 14;

    /// Simulated cache hit latency in cycles.
    pub const SIM_CACHE_HIT: u64 = 4;

    /// Simulated cost of the clock reads themselves.
    pub const SIM_TIMER_OVERHEAD: u64 = 24;
}

/// Serialization strength of the cycle-clock reads.
///
/// Both strengths give the same qualitative answer; they differ in the
/// constant offset they add to every sample, so one experiment must not
/// mix them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Serialization {
    /// `lfence` around `rdtscp`: orders memory operations only.
    #[default]
    #[serde(alias = "lfence")]
    LoadFence,
    /// Additionally executes `cpuid` on both sides: fully serializes the pipeline.
    #[serde(alias = "cpuid")]
    Full,
}

/// Row-buffer management policy of the simulated memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PagePolicy {
    /// Rows stay latched after an access until a conflicting access arrives.
    #[default]
    Open,
    /// Rows are precharged immediately after every access.
    Closed,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Cache-line size and arena geometry.
    #[serde(default)]
    pub arena: ArenaConfig,
    /// Trial and warm-up counts, clock serialization and anomaly bounds.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Address-space scan window.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Fixed offsets for the row-hit and row-pair measurements.
    #[serde(default)]
    pub row: RowConfig,
    /// Classifier margins.
    #[serde(default)]
    pub classifier: Thresholds,
    /// Block-copy size sweep.
    #[serde(default)]
    pub copy_sweep: CopySweepConfig,
    /// Simulated memory backend parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl ProbeConfig {
    /// Parses a JSON document; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies the trial-count override from the process environment, if set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let value = std::env::var(TRIAL_COUNT_ENV).ok();
        self.apply_trial_override(value.as_deref())
    }

    /// Applies a raw trial-count override to every timed configuration.
    ///
    /// `None` leaves the configuration untouched. Range checking happens in
    /// [`validate`](Self::validate) so that an override of `1` is reported as
    /// a trial-count error rather than a parse error.
    pub fn apply_trial_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        let Some(raw) = value else {
            return Ok(());
        };
        let trials = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::EnvOverride {
                var: TRIAL_COUNT_ENV,
                value: raw.to_owned(),
            })?;
        self.set_trial_count(trials);
        Ok(())
    }

    /// Sets the timed trial count of both the row experiments and the copy sweep.
    pub const fn set_trial_count(&mut self, trials: usize) {
        self.sampler.trial_count = trials;
        self.copy_sweep.trial_count = trials;
    }

    /// Checks every cross-field constraint before any memory is allocated.
    pub fn validate(&self) -> Result<(), ProbeError> {
        let arena = &self.arena;
        let line = arena.line_size;
        if !line.is_power_of_two() {
            return Err(ProbeError::InvalidAlignment(line));
        }
        if !arena.alignment.is_power_of_two() || arena.alignment < line {
            return Err(ProbeError::InvalidAlignment(arena.alignment));
        }

        for trials in [self.sampler.trial_count, self.copy_sweep.trial_count] {
            if trials < 2 {
                return Err(ConfigError::TrialCount(trials).into());
            }
        }

        let sampler = &self.sampler;
        if sampler.min_plausible_cycles > sampler.max_plausible_cycles {
            return Err(ConfigError::PlausibleRange {
                min: sampler.min_plausible_cycles,
                max: sampler.max_plausible_cycles,
            }
            .into());
        }

        let scan = &self.scan;
        if scan.stride == 0 {
            return Err(ConfigError::Stride.into());
        }
        let end = scan.end_for(arena.size_bytes);
        if scan.start_offset >= end || end > arena.size_bytes {
            return Err(ConfigError::ScanRange {
                start: scan.start_offset,
                end,
                arena: arena.size_bytes,
            }
            .into());
        }

        if candidate_offsets(scan, arena.size_bytes, line).next().is_none() {
            return Err(ConfigError::NoCandidates {
                start: scan.start_offset,
                end,
                stride: scan.stride,
            }
            .into());
        }

        let base = scan.base_offset;
        if base.saturating_add(self.row.hit_offset) / line == base / line {
            return Err(ConfigError::HitOffset {
                offset: self.row.hit_offset,
                line,
            }
            .into());
        }
        for (name, offset) in [
            ("base", base),
            ("hit", base.saturating_add(self.row.hit_offset)),
            ("row stride", base.saturating_add(self.row.row_stride)),
        ] {
            if offset.saturating_add(line) > arena.size_bytes {
                return Err(ConfigError::Offset {
                    name,
                    offset,
                    arena: arena.size_bytes,
                }
                .into());
            }
        }

        self.classifier.validate()?;

        let exps = &self.copy_sweep.size_exponents;
        if exps.is_empty() || exps.iter().any(|&e| e >= usize::BITS - 1) {
            return Err(ConfigError::SweepSizes(exps.clone()).into());
        }

        Ok(())
    }
}

/// Arena geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Arena size in bytes.
    #[serde(default = "ArenaConfig::default_size")]
    pub size_bytes: usize,

    /// Base address alignment in bytes (power of two, at least one line).
    #[serde(default = "ArenaConfig::default_alignment")]
    pub alignment: usize,

    /// Cache-line size in bytes.
    #[serde(default = "ArenaConfig::default_line_size")]
    pub line_size: usize,

    /// Byte pattern written over the whole arena before timing.
    #[serde(default = "ArenaConfig::default_fill_byte")]
    pub fill_byte: u8,

    /// Try to `mlock` the arena. Failure is logged, not fatal.
    #[serde(default)]
    pub lock_pages: bool,
}

impl ArenaConfig {
    fn default_size() -> usize {
        defaults::ARENA_SIZE
    }

    fn default_alignment() -> usize {
        defaults::ARENA_ALIGNMENT
    }

    fn default_line_size() -> usize {
        defaults::LINE_SIZE
    }

    fn default_fill_byte() -> u8 {
        defaults::FILL_BYTE
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size_bytes: defaults::ARENA_SIZE,
            alignment: defaults::ARENA_ALIGNMENT,
            line_size: defaults::LINE_SIZE,
            fill_byte: defaults::FILL_BYTE,
            lock_pages: false,
        }
    }
}

/// Sampler parameters shared by every configuration of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Timed trials per configuration (at least 2).
    #[serde(default = "SamplerConfig::default_trial_count")]
    pub trial_count: usize,

    /// Untimed rounds run first and discarded.
    #[serde(default = "SamplerConfig::default_warmup_count")]
    pub warmup_count: usize,

    /// Clock serialization strength.
    #[serde(default)]
    pub serialization: Serialization,

    /// Issue a load fence between the loads of a dependent chain.
    #[serde(default = "SamplerConfig::default_fence_between_loads")]
    pub fence_between_loads: bool,

    /// Deltas below this are discarded as anomalies.
    #[serde(default = "SamplerConfig::default_min_plausible")]
    pub min_plausible_cycles: u64,

    /// Deltas above this are discarded as anomalies.
    #[serde(default = "SamplerConfig::default_max_plausible")]
    pub max_plausible_cycles: u64,

    /// Anomalies tolerated per configuration before sampling fails.
    #[serde(default = "SamplerConfig::default_max_resamples")]
    pub max_resamples: usize,
}

impl SamplerConfig {
    fn default_trial_count() -> usize {
        defaults::TRIAL_COUNT
    }

    fn default_warmup_count() -> usize {
        defaults::WARMUP_COUNT
    }

    fn default_fence_between_loads() -> bool {
        true
    }

    fn default_min_plausible() -> u64 {
        defaults::MIN_PLAUSIBLE_CYCLES
    }

    fn default_max_plausible() -> u64 {
        defaults::MAX_PLAUSIBLE_CYCLES
    }

    fn default_max_resamples() -> usize {
        defaults::MAX_RESAMPLES
    }

    /// Returns `true` if `delta` lies in the plausible window.
    pub const fn is_plausible(&self, delta: u64) -> bool {
        delta >= self.min_plausible_cycles && delta <= self.max_plausible_cycles
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            trial_count: defaults::TRIAL_COUNT,
            warmup_count: defaults::WARMUP_COUNT,
            serialization: Serialization::default(),
            fence_between_loads: true,
            min_plausible_cycles: defaults::MIN_PLAUSIBLE_CYCLES,
            max_plausible_cycles: defaults::MAX_PLAUSIBLE_CYCLES,
            max_resamples: defaults::MAX_RESAMPLES,
        }
    }
}

/// Candidate window swept by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Offset of the fixed base address A.
    #[serde(default)]
    pub base_offset: usize,

    /// First candidate offset (relative to the arena start).
    #[serde(default = "ScanConfig::default_start")]
    pub start_offset: usize,

    /// End of the window (exclusive); `None` means the end of the arena.
    #[serde(default)]
    pub end_offset: Option<usize>,

    /// Step between candidates.
    #[serde(default = "ScanConfig::default_stride")]
    pub stride: usize,
}

impl ScanConfig {
    fn default_start() -> usize {
        defaults::SCAN_START
    }

    fn default_stride() -> usize {
        defaults::SCAN_STRIDE
    }

    /// Resolves the exclusive end of the window for an arena of `arena_size` bytes.
    pub fn end_for(&self, arena_size: usize) -> usize {
        self.end_offset.unwrap_or(arena_size)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            base_offset: 0,
            start_offset: defaults::SCAN_START,
            end_offset: None,
            stride: defaults::SCAN_STRIDE,
        }
    }
}

/// Fixed offsets relative to the base address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowConfig {
    /// Column offset presumed to stay in the base address's row.
    #[serde(default = "RowConfig::default_hit_offset")]
    pub hit_offset: usize,

    /// Offset presumed to land in a different row.
    #[serde(default = "RowConfig::default_row_stride")]
    pub row_stride: usize,
}

impl RowConfig {
    fn default_hit_offset() -> usize {
        defaults::HIT_OFFSET
    }

    fn default_row_stride() -> usize {
        defaults::ROW_STRIDE
    }
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            hit_offset: defaults::HIT_OFFSET,
            row_stride: defaults::ROW_STRIDE,
        }
    }
}

/// Classifier margins.
///
/// These are tuning values, not hardware invariants; the defaults are the
/// ones the reference experiment used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// k1: conflict must exceed both hit and no-conflict by this factor for `OpenRow`.
    #[serde(default = "Thresholds::default_open_margin")]
    pub open_margin: f64,

    /// epsilon1: relative hit vs no-conflict spread allowed for `ClosedRow`.
    #[serde(default = "Thresholds::default_hit_tolerance")]
    pub hit_tolerance: f64,

    /// epsilon2: relative conflict vs hit spread allowed for `ClosedRow`.
    #[serde(default = "Thresholds::default_conflict_tolerance")]
    pub conflict_tolerance: f64,
}

impl Thresholds {
    fn default_open_margin() -> f64 {
        defaults::OPEN_MARGIN
    }

    fn default_hit_tolerance() -> f64 {
        defaults::HIT_TOLERANCE
    }

    fn default_conflict_tolerance() -> f64 {
        defaults::CONFLICT_TOLERANCE
    }

    /// Rejects non-positive or non-finite margins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("open_margin", self.open_margin),
            ("hit_tolerance", self.hit_tolerance),
            ("conflict_tolerance", self.conflict_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            open_margin: defaults::OPEN_MARGIN,
            hit_tolerance: defaults::HIT_TOLERANCE,
            conflict_tolerance: defaults::CONFLICT_TOLERANCE,
        }
    }
}

/// Block-copy size sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySweepConfig {
    /// Copy sizes as powers of two.
    #[serde(default = "CopySweepConfig::default_exponents")]
    pub size_exponents: Vec<u32>,

    /// Timed copies per size (at least 2).
    #[serde(default = "CopySweepConfig::default_trial_count")]
    pub trial_count: usize,

    /// Untimed copies per size.
    #[serde(default = "SamplerConfig::default_warmup_count")]
    pub warmup_count: usize,
}

impl CopySweepConfig {
    fn default_exponents() -> Vec<u32> {
        defaults::COPY_EXPONENTS.to_vec()
    }

    fn default_trial_count() -> usize {
        defaults::COPY_TRIAL_COUNT
    }

    /// Copy sizes in bytes, in sweep order.
    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.size_exponents.iter().map(|&e| 1usize << e)
    }

    /// Largest copy size in bytes.
    pub fn max_size(&self) -> usize {
        self.sizes().max().unwrap_or(0)
    }
}

impl Default for CopySweepConfig {
    fn default() -> Self {
        Self {
            size_exponents: defaults::COPY_EXPONENTS.to_vec(),
            trial_count: defaults::COPY_TRIAL_COUNT,
            warmup_count: defaults::WARMUP_COUNT,
        }
    }
}

/// Parameters of the simulated memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Page policy of the simulated controller.
    #[serde(default)]
    pub policy: PagePolicy,

    /// Row size in bytes (power of two).
    #[serde(default = "SimulationConfig::default_row_bytes")]
    pub row_bytes: usize,

    /// Bank count (power of two).
    #[serde(default = "SimulationConfig::default_banks")]
    pub banks: usize,

    /// CAS latency.
    #[serde(default = "SimulationConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS (activate) latency.
    #[serde(default = "SimulationConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency.
    #[serde(default = "SimulationConfig::default_t_pre")]
    pub t_pre: u64,

    /// Latency of a load that hits a cached line.
    #[serde(default = "SimulationConfig::default_cache_hit")]
    pub cache_hit: u64,

    /// Cycles added to every begin/end pair.
    #[serde(default = "SimulationConfig::default_timer_overhead")]
    pub timer_overhead: u64,
}

impl SimulationConfig {
    fn default_row_bytes() -> usize {
        defaults::SIM_ROW_BYTES
    }

    fn default_banks() -> usize {
        defaults::SIM_BANKS
    }

    fn default_t_cas() -> u64 {
        defaults::SIM_T_CAS
    }

    fn default_t_ras() -> u64 {
        defaults::SIM_T_RAS
    }

    fn default_t_pre() -> u64 {
        defaults::SIM_T_PRE
    }

    fn default_cache_hit() -> u64 {
        defaults::SIM_CACHE_HIT
    }

    fn default_timer_overhead() -> u64 {
        defaults::SIM_TIMER_OVERHEAD
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            policy: PagePolicy::default(),
            row_bytes: defaults::SIM_ROW_BYTES,
            banks: defaults::SIM_BANKS,
            t_cas: defaults::SIM_T_CAS,
            t_ras: defaults::SIM_T_RAS,
            t_pre: defaults::SIM_T_PRE,
            cache_hit: defaults::SIM_CACHE_HIT,
            timer_overhead: defaults::SIM_TIMER_OVERHEAD,
        }
    }
}
