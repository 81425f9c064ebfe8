//! Trial sampler.
//!
//! One call to [`Sampler::measure`] produces the sample set of one
//! configuration:
//! 1. `warmup_count` untimed rounds (invalidate, execute) settle the
//!    instruction cache, TLB and page tables; nothing from them is kept.
//! 2. Each timed trial invalidates every region the access touches, reads
//!    the clock, executes, reads the clock again and keeps `end - begin`.
//! 3. Deltas that are negative or outside the plausible window are discarded
//!    and the trial is repeated, up to `max_resamples` times in total.
//!
//! The set always ends up with exactly `trial_count` samples.

use std::hint::black_box;

use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{ConfigError, MeasurementError, ProbeError};
use crate::config::SamplerConfig;
use crate::stats::{Aggregate, SampleSet};

use super::instruments::Instruments;
use super::pattern::{Access, Pattern, execute};

/// Result of sampling one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    /// Configuration label (e.g. `row-hit`, `copy-4096`).
    pub label: String,
    /// Pattern that was timed.
    pub pattern: Pattern,
    /// Summary of the samples.
    pub aggregate: Aggregate,
    /// The samples themselves.
    #[serde(skip)]
    pub samples: SampleSet,
}

impl Run {
    /// Median cycles of the run.
    pub fn median(&self) -> u64 {
        self.aggregate.median
    }
}

/// Repeats an access under the instruments and collects cycle deltas.
#[derive(Debug)]
pub struct Sampler<'i, I: Instruments + ?Sized> {
    instruments: &'i mut I,
    config: SamplerConfig,
}

impl<'i, I: Instruments + ?Sized> Sampler<'i, I> {
    /// Creates a sampler with the given trial counts and anomaly bounds.
    ///
    /// # Arguments
    ///
    /// * `instruments` - Clock, invalidator and memory port shared by every measurement.
    /// * `config` - Trial and warm-up counts, plausibility window and resample budget.
    ///
    /// # Returns
    ///
    /// A sampler borrowing `instruments` for its lifetime.
    ///
    /// # Errors
    ///
    /// [`ConfigError::TrialCount`] if fewer than two timed trials are requested.
    pub fn new(instruments: &'i mut I, config: &SamplerConfig) -> Result<Self, ProbeError> {
        if config.trial_count < 2 {
            return Err(ConfigError::TrialCount(config.trial_count).into());
        }
        Ok(Self {
            instruments,
            config: config.clone(),
        })
    }

    /// Makes every region of `access` cold.
    fn invalidate(&mut self, access: &Access<'_>) {
        let instruments = &mut *self.instruments;
        access.for_each_region(|region| instruments.invalidate(region));
    }

    /// Times exactly one execution of `access` from a cold start.
    ///
    /// Returns `None` if the clock went backwards.
    #[inline]
    pub fn trial(&mut self, access: &mut Access<'_>) -> Option<u64> {
        self.invalidate(access);
        let begin = self.instruments.begin();
        let observed = execute(&mut *self.instruments, access);
        let end = self.instruments.end();
        let _ = black_box(observed);
        end.checked_sub(begin)
    }

    /// Runs warm-up rounds then `trial_count` timed trials of `access`.
    ///
    /// # Errors
    ///
    /// [`MeasurementError::ResampleBudgetExhausted`] if more than
    /// `max_resamples` deltas had to be discarded.
    pub fn measure(&mut self, label: &str, access: &mut Access<'_>) -> Result<Run, ProbeError> {
        for _ in 0..self.config.warmup_count {
            self.invalidate(access);
            let _ = black_box(execute(&mut *self.instruments, access));
        }

        let requested = self.config.trial_count;
        let mut samples = Vec::with_capacity(requested);
        let mut anomalies = 0usize;

        while samples.len() < requested {
            match self.trial(access) {
                Some(delta) if self.config.is_plausible(delta) => samples.push(delta),
                delta => {
                    anomalies += 1;
                    warn!(label, ?delta, anomalies, "discarding anomalous sample");
                    if anomalies > self.config.max_resamples {
                        return Err(MeasurementError::ResampleBudgetExhausted {
                            label: label.to_owned(),
                            collected: samples.len(),
                            requested,
                            anomalies,
                        }
                        .into());
                    }
                }
            }
        }

        let samples =
            SampleSet::new(samples, anomalies).ok_or(ConfigError::TrialCount(requested))?;
        let aggregate = samples.aggregate();
        debug!(
            label,
            pattern = %access.pattern(),
            median = aggregate.median,
            min = aggregate.min,
            max = aggregate.max,
            anomalies,
            "configuration sampled"
        );

        Ok(Run {
            label: label.to_owned(),
            pattern: access.pattern(),
            aggregate,
            samples,
        })
    }
}
