//! Result output.
//!
//! This module turns experiment reports into the three stable output forms:
//! 1. **CSV:** One `key,cycles` row per raw sample, in trial order.
//! 2. **Summary:** A sectioned plain-text listing of medians, ratios and verdict.
//! 3. **JSON:** The serialized report for machine consumption.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::common::constants::{CSV_LABEL_HEADER, CSV_SIZE_HEADER};
use crate::probe::{CopySweepReport, RowPairReport, RowPolicyReport, Run};
use crate::stats::{Aggregate, SampleSet};

const RULE: &str = "----------------------------------------------------------";
const BANNER: &str = "==========================================================";

/// Streams raw samples as CSV.
#[derive(Debug)]
pub struct CsvSink<W: Write> {
    out: W,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    /// Creates a sink and writes `header` as the first line.
    pub fn new(mut out: W, header: &str) -> io::Result<Self> {
        writeln!(out, "{header}")?;
        Ok(Self { out, rows: 0 })
    }

    /// A sink keyed by transfer size (`size,cycles`).
    pub fn by_size(out: W) -> io::Result<Self> {
        Self::new(out, CSV_SIZE_HEADER)
    }

    /// A sink keyed by configuration label (`label,cycles`).
    pub fn by_label(out: W) -> io::Result<Self> {
        Self::new(out, CSV_LABEL_HEADER)
    }

    /// Writes one row per sample of `samples`, keyed by `key`.
    pub fn write_samples(&mut self, key: impl fmt::Display, samples: &SampleSet) -> io::Result<()> {
        for cycles in samples.raw() {
            writeln!(self.out, "{key},{cycles}")?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Writes every sample of `run`, keyed by its label.
    pub fn write_run(&mut self, run: &Run) -> io::Result<()> {
        self.write_samples(&run.label, &run.samples)
    }

    /// Sample rows written so far (header excluded).
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Writes every run of a row-policy report to a `label,cycles` sink.
pub fn write_row_policy<W: Write>(sink: &mut CsvSink<W>, report: &RowPolicyReport) -> io::Result<()> {
    for run in report.runs() {
        sink.write_run(run)?;
    }
    Ok(())
}

/// Writes both runs of a row-pair report to a `label,cycles` sink.
pub fn write_row_pair<W: Write>(sink: &mut CsvSink<W>, report: &RowPairReport) -> io::Result<()> {
    sink.write_run(&report.same_row)?;
    sink.write_run(&report.different_row)
}

/// Writes every copy run to a `size,cycles` sink.
pub fn write_copy_sweep<W: Write>(sink: &mut CsvSink<W>, report: &CopySweepReport) -> io::Result<()> {
    for copy in &report.runs {
        sink.write_samples(copy.size, &copy.run.samples)?;
    }
    Ok(())
}

/// Serializes any report as pretty JSON.
pub fn to_json<T: Serialize>(report: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn write_aggregate(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    agg: &Aggregate,
    cycles_per_ns: Option<f64>,
) -> fmt::Result {
    write!(
        f,
        "{label:<24} median {:>8}  min {:>8}  max {:>10}  n {:>6}  dropped {:>4}",
        agg.median, agg.min, agg.max, agg.count, agg.anomalies
    )?;
    if let Some(rate) = cycles_per_ns.filter(|r| *r > 0.0) {
        #[allow(clippy::cast_precision_loss)]
        let ns = agg.median as f64 / rate;
        write!(f, "  (~{ns:.1} ns)")?;
    }
    writeln!(f)
}

fn write_banner(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{BANNER}")?;
    writeln!(f, "{title}")?;
    writeln!(f, "{BANNER}")
}

impl fmt::Display for RowPolicyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = &self.classification;
        write_banner(f, "ROW-BUFFER POLICY")?;
        writeln!(f, "base_offset              {:#x}", self.base_offset)?;
        writeln!(
            f,
            "scan                     {} candidates, min @ {:#x} ({}), max @ {:#x} ({})",
            self.scan.points.len(),
            self.scan.min.offset,
            self.scan.min.median,
            self.scan.max.offset,
            self.scan.max.median
        )?;
        writeln!(f, "{RULE}")?;
        for run in self.runs() {
            write_aggregate(f, &run.label, &run.aggregate, self.cycles_per_ns)?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "conflict/hit             {:.3}", class.conflict_over_hit())?;
        writeln!(
            f,
            "conflict/no-conflict     {:.3}",
            class.conflict_over_no_conflict()
        )?;
        writeln!(
            f,
            "thresholds               k1 {}  e1 {}  e2 {}",
            class.thresholds.open_margin,
            class.thresholds.hit_tolerance,
            class.thresholds.conflict_tolerance
        )?;
        writeln!(f, "verdict                  {}", class.verdict)
    }
}

impl fmt::Display for RowPairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_banner(f, "ROW PAIR")?;
        writeln!(f, "base_offset              {:#x}", self.base_offset)?;
        writeln!(f, "{RULE}")?;
        for run in [&self.same_row, &self.different_row] {
            write_aggregate(f, &run.label, &run.aggregate, self.cycles_per_ns)?;
        }
        writeln!(f, "{RULE}")?;
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.different_row.median() as f64 / self.same_row.median().max(1) as f64;
        writeln!(f, "different/same           {ratio:.3}")
    }
}

impl fmt::Display for CopySweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_banner(f, "BLOCK COPY SWEEP")?;
        for copy in &self.runs {
            write_aggregate(f, &copy.run.label, &copy.run.aggregate, self.cycles_per_ns)?;
        }
        writeln!(f, "{RULE}")
    }
}
