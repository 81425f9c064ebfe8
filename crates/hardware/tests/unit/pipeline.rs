//! End-to-End Pipeline Tests.
//!
//! Runs the experiments (sampler, scanner, classifier) against synthetic
//! instruments with planted latencies and against the simulated backend
//! under both page policies, checking that the known answer comes back.

use pretty_assertions::assert_eq;
use rowprobe_core::ProbeConfig;
use rowprobe_core::common::{KIB, ProbeError};
use rowprobe_core::config::PagePolicy;
use rowprobe_core::memory::Arena;
use rowprobe_core::probe::{Verdict, copy_sweep, row_pair, row_policy};
use rstest::rstest;

use crate::common::harness::{init_tracing, simulated, small_config};
use crate::common::mocks::SyntheticRig;

/// Offsets 512 KiB apart share a bank in the planted layout.
const SAME_BANK: usize = 512 * KIB;

// ══════════════════════════════════════════════════════════
// 1. Synthetic instruments
// ══════════════════════════════════════════════════════════

#[test]
fn synthetic_open_row_layout_is_classified_open() {
    init_tracing();
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let mut rig = SyntheticRig::new(arena.as_ptr(), 0, |offset| {
        if offset == 512 {
            40
        } else if offset % SAME_BANK == 0 {
            100
        } else {
            42
        }
    });

    let report = row_policy(&mut rig, &arena, &config).unwrap();
    assert_eq!(report.hit.median(), 40);
    assert_eq!(report.no_conflict.median(), 42);
    assert_eq!(report.conflict.median(), 100);
    assert_eq!(report.scan.min.offset, 64 * KIB);
    assert_eq!(report.scan.max.offset, SAME_BANK);
    assert_eq!(report.classification.verdict, Verdict::OpenRow);
}

#[test]
fn synthetic_flat_layout_is_classified_closed() {
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let mut rig = SyntheticRig::new(arena.as_ptr(), 0, |offset| {
        if offset == 512 {
            80
        } else if offset % SAME_BANK == 0 {
            88
        } else {
            82
        }
    });

    let report = row_policy(&mut rig, &arena, &config).unwrap();
    let class = report.classification;
    assert_eq!((class.hit, class.no_conflict, class.conflict), (80, 82, 88));
    assert_eq!(class.verdict, Verdict::ClosedRow);
}

#[test]
fn synthetic_row_pair_reports_both_medians() {
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let row_stride = config.row.row_stride;
    let mut rig = SyntheticRig::new(arena.as_ptr(), 0, move |offset| {
        if offset == row_stride { 100 } else { 40 }
    });

    let report = row_pair(&mut rig, &arena, &config).unwrap();
    assert_eq!(report.same_row.median(), 40);
    assert_eq!(report.different_row.median(), 100);
    assert_eq!(report.same_row.label, "row-hit");
    assert_eq!(report.different_row.label, "row-miss");
}

#[rstest]
#[case::hit_offset(|c: &mut ProbeConfig| c.row.hit_offset = usize::MAX)]
#[case::row_stride(|c: &mut ProbeConfig| c.row.row_stride = usize::MAX)]
fn overflowing_partner_offset_is_out_of_bounds(#[case] mutate: fn(&mut ProbeConfig)) {
    let mut config = small_config();
    config.scan.base_offset = 64;
    mutate(&mut config);
    let arena = Arena::from_config(&config.arena).unwrap();
    let mut rig = SyntheticRig::new(arena.as_ptr(), 64, |_| 40);

    let err = row_pair(&mut rig, &arena, &config).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, ProbeError::OutOfBounds { offset: 64, len: usize::MAX, .. }));
}

// ══════════════════════════════════════════════════════════
// 2. Simulated backend
// ══════════════════════════════════════════════════════════

#[test]
fn simulated_open_page_controller_is_classified_open() {
    init_tracing();
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let mut sim = simulated(&config, PagePolicy::Open);

    let report = row_policy(&mut sim, &arena, &config).unwrap();
    assert_eq!(report.classification.verdict, Verdict::OpenRow);
    // overhead + activate-free hits, versus two precharge+activate loads.
    assert_eq!(report.hit.median(), 24 + 14 + 14 + 4);
    assert_eq!(report.conflict.median(), 24 + 42 + 42 + 4);
    assert_eq!(report.scan.max.offset % SAME_BANK, 0);
}

#[test]
fn simulated_closed_page_controller_is_classified_closed() {
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let mut sim = simulated(&config, PagePolicy::Closed);

    let report = row_policy(&mut sim, &arena, &config).unwrap();
    let class = report.classification;
    assert_eq!(class.verdict, Verdict::ClosedRow);
    assert_eq!(class.hit, 24 + 28 + 28 + 4);
    assert_eq!(class.hit, class.no_conflict);
    assert_eq!(class.hit, class.conflict);
}

#[test]
fn simulated_runs_are_reproducible() {
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let first = row_policy(&mut simulated(&config, PagePolicy::Open), &arena, &config).unwrap();
    let second = row_policy(&mut simulated(&config, PagePolicy::Open), &arena, &config).unwrap();
    assert_eq!(first.classification, second.classification);
    assert_eq!(first.scan, second.scan);
}

#[test]
fn simulated_copy_cost_grows_with_size() {
    let config = small_config();
    let mut sim = simulated(&config, PagePolicy::Open);

    let report = copy_sweep(&mut sim, &config).unwrap();
    let sizes: Vec<_> = report.runs.iter().map(|c| c.size).collect();
    assert_eq!(sizes, vec![64, 256, 4096]);
    assert_eq!(report.runs[0].run.label, "copy-64");
    assert!(report.runs.iter().all(|c| c.run.samples.len() == 4));
    assert!(report.runs.windows(2).all(|w| w[0].run.median() < w[1].run.median()));
}
