//! Result Output Unit Tests.
//!
//! Verifies the CSV header and row format, file output through a real
//! writer, the plain-text summary and the JSON form.

use std::fs;
use std::io::BufWriter;

use pretty_assertions::assert_eq;
use rowprobe_core::common::constants::{CSV_LABEL_HEADER, CSV_SIZE_HEADER};
use rowprobe_core::config::PagePolicy;
use rowprobe_core::memory::Arena;
use rowprobe_core::probe::{copy_sweep, row_policy};
use rowprobe_core::report::{CsvSink, to_json, write_copy_sweep, write_row_policy};
use rowprobe_core::stats::SampleSet;

use crate::common::harness::{simulated, small_config};

#[test]
fn header_then_one_row_per_sample_in_trial_order() {
    let samples = SampleSet::new(vec![120, 95, 130], 0).unwrap();
    let mut sink = CsvSink::by_size(Vec::new()).unwrap();
    sink.write_samples(4096, &samples).unwrap();
    assert_eq!(sink.rows(), 3);

    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(text, "size,cycles\n4096,120\n4096,95\n4096,130\n");
}

#[test]
fn header_constants_are_stable() {
    assert_eq!(CSV_SIZE_HEADER, "size,cycles");
    assert_eq!(CSV_LABEL_HEADER, "label,cycles");
}

#[test]
fn copy_sweep_csv_file_has_every_sample() {
    let config = small_config();
    let report = copy_sweep(&mut simulated(&config, PagePolicy::Open), &config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("copy.csv");
    let file = fs::File::create(&path).unwrap();
    let mut sink = CsvSink::by_size(BufWriter::new(file)).unwrap();
    write_copy_sweep(&mut sink, &report).unwrap();
    sink.into_inner().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("size,cycles"));
    let rows: Vec<(usize, u64)> = lines
        .map(|l| {
            let (size, cycles) = l.split_once(',').unwrap();
            (size.parse().unwrap(), cycles.parse().unwrap())
        })
        .collect();
    assert_eq!(rows.len(), 3 * 4);
    assert_eq!(rows.iter().filter(|(size, _)| *size == 256).count(), 4);
    assert!(rows.iter().all(|(_, cycles)| *cycles > 0));
}

#[test]
fn row_policy_outputs() {
    let config = small_config();
    let arena = Arena::from_config(&config.arena).unwrap();
    let report = row_policy(&mut simulated(&config, PagePolicy::Open), &arena, &config).unwrap();

    let mut sink = CsvSink::by_label(Vec::new()).unwrap();
    write_row_policy(&mut sink, &report).unwrap();
    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    let labels: Vec<_> = text.lines().skip(1).map(|l| l.split(',').next().unwrap()).collect();
    assert_eq!(labels.len(), 3 * config.sampler.trial_count);
    assert_eq!(labels[0], "row-hit");
    assert_eq!(labels[labels.len() - 1], "row-conflict");

    let summary = report.to_string();
    assert!(summary.contains("ROW-BUFFER POLICY"));
    assert!(summary.contains("no-conflict"));
    assert!(summary.contains("verdict                  OPEN_ROW"));

    let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
    assert_eq!(json["classification"]["verdict"], "OPEN_ROW");
    assert_eq!(json["hit"]["label"], "row-hit");
    assert_eq!(json["hit"]["pattern"], "dependent-chain");
    assert_eq!(json["conflict"]["aggregate"]["median"], report.conflict.median());
    assert!(json.get("cycles_per_ns").is_none());
}
