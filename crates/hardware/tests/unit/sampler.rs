//! Trial Sampler Unit Tests.
//!
//! Verifies the exact sample count, the cold precondition of every trial,
//! anomaly discard-and-resample and the resample budget.

use proptest::prelude::*;
use rowprobe_core::common::{ConfigError, MeasurementError, ProbeError};
use rowprobe_core::config::SamplerConfig;
use rowprobe_core::memory::{FixedLatency, SimulatedMemory};
use rowprobe_core::probe::{Access, Pattern, Sampler};

use crate::common::harness::init_tracing;
use crate::common::mocks::{SyntheticRig, scripted_rig};

fn sampler_config(trials: usize, warmup: usize) -> SamplerConfig {
    SamplerConfig {
        trial_count: trials,
        warmup_count: warmup,
        ..SamplerConfig::default()
    }
}

// ══════════════════════════════════════════════════════════
// 1. Sample count and cold starts
// ══════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn produces_exactly_the_requested_samples(trials in 2usize..64, warmup in 0usize..5) {
        let data = [0u8; 128];
        let mut sim = SimulatedMemory::with_controller(FixedLatency::new(100), 64, 4, 24);
        let mut sampler = Sampler::new(&mut sim, &sampler_config(trials, warmup)).unwrap();
        let run = sampler.measure("chain", &mut Access::chain(&data[0], &data[64])).unwrap();

        prop_assert_eq!(run.samples.len(), trials);
        prop_assert_eq!(run.aggregate.count, trials);
        prop_assert_eq!(run.aggregate.anomalies, 0);
        // Both lines are cold every trial: overhead + two DRAM loads + one hit.
        prop_assert!(run.samples.raw().iter().all(|&d| d == 24 + 100 + 100 + 4));
    }
}

#[test]
fn every_trial_and_warmup_invalidates_each_region() {
    let data = [0u8; 128];
    let mut rig = SyntheticRig::new(data.as_ptr(), 0, |_| 40);
    let run = Sampler::new(&mut rig, &sampler_config(7, 3))
        .unwrap()
        .measure("chain", &mut Access::chain(&data[0], &data[64]))
        .unwrap();
    assert_eq!(run.median(), 40);
    assert_eq!(run.pattern, Pattern::DependentChain);
    assert_eq!(run.label, "chain");
    assert_eq!(rig.invalidations, 2 * (7 + 3));
}

#[test]
fn rejects_fewer_than_two_trials() {
    let mut rig = scripted_rig(vec![10]);
    assert!(matches!(
        Sampler::new(&mut rig, &sampler_config(1, 0)),
        Err(ProbeError::Config(ConfigError::TrialCount(1)))
    ));
}

// ══════════════════════════════════════════════════════════
// 2. Anomalies
// ══════════════════════════════════════════════════════════

#[test]
fn negative_deltas_are_discarded_and_resampled() {
    init_tracing();
    let data = [0u8; 1];
    let mut rig = scripted_rig(vec![-5, 50, 60, -1, 70]);
    let run = Sampler::new(&mut rig, &sampler_config(3, 0))
        .unwrap()
        .measure("load", &mut Access::load(&data[0]))
        .unwrap();
    assert_eq!(run.samples.raw(), &[50, 60, 70]);
    assert_eq!(run.aggregate.anomalies, 2);
    assert_eq!(run.median(), 60);
}

#[test]
fn implausible_deltas_are_discarded() {
    let data = [0u8; 1];
    let config = SamplerConfig {
        max_plausible_cycles: 1_000,
        ..sampler_config(2, 0)
    };
    let mut rig = scripted_rig(vec![0, 5_000, 80, 90]);
    let run = Sampler::new(&mut rig, &config)
        .unwrap()
        .measure("load", &mut Access::load(&data[0]))
        .unwrap();
    assert_eq!(run.samples.raw(), &[80, 90]);
    assert_eq!(run.samples.anomalies(), 2);
}

#[test]
fn exhausted_budget_is_a_measurement_error() {
    let data = [0u8; 1];
    let config = SamplerConfig {
        max_resamples: 3,
        ..sampler_config(4, 0)
    };
    let mut rig = scripted_rig(vec![25, -10, -10]);
    let err = Sampler::new(&mut rig, &config)
        .unwrap()
        .measure("load", &mut Access::load(&data[0]))
        .unwrap_err();
    assert!(!err.is_fatal());
    match err {
        ProbeError::Measurement(MeasurementError::ResampleBudgetExhausted {
            label,
            collected,
            requested,
            anomalies,
        }) => {
            assert_eq!(label, "load");
            assert_eq!(collected, 2);
            assert_eq!(requested, 4);
            assert_eq!(anomalies, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
}
