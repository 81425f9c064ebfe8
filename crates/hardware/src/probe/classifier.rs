//! Row-buffer policy classifier.
//!
//! Rules, applied in order to the three medians:
//! - `conflict > hit * k1` and `conflict > no_conflict * k1`: [`Verdict::OpenRow`].
//! - `|hit - no_conflict| < e1 * hit` and `|conflict - hit| < e2 * hit`:
//!   [`Verdict::ClosedRow`].
//! - exactly one of the two open-row comparisons held: [`Verdict::Adaptive`].
//! - otherwise: [`Verdict::Inconclusive`].
//!
//! Classification never fails. The medians are kept next to the verdict so a
//! caller can [`Classification::rejudge`] with other margins without measuring
//! again.

use std::fmt;

use serde::Serialize;

use crate::config::Thresholds;

/// Qualitative verdict on the controller's page policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Rows stay open; only same-bank, different-row accesses pay a penalty.
    OpenRow,
    /// Every access pays a comparable open/close cost.
    ClosedRow,
    /// The conflict penalty shows against one reference but not the other.
    Adaptive,
    /// The signal fits no rule.
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenRow => "OPEN_ROW",
            Self::ClosedRow => "CLOSED_ROW",
            Self::Adaptive => "ADAPTIVE",
            Self::Inconclusive => "INCONCLUSIVE",
        })
    }
}

/// A verdict together with the evidence it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    /// The verdict.
    pub verdict: Verdict,
    /// Row-hit median (cycles).
    pub hit: u64,
    /// No-conflict median (cycles).
    pub no_conflict: u64,
    /// Row-conflict median (cycles).
    pub conflict: u64,
    /// Margins the verdict was derived with.
    pub thresholds: Thresholds,
}

impl Classification {
    /// `conflict / hit`, or infinity for a zero hit median.
    pub fn conflict_over_hit(&self) -> f64 {
        ratio(self.conflict, self.hit)
    }

    /// `conflict / no_conflict`, or infinity for a zero no-conflict median.
    pub fn conflict_over_no_conflict(&self) -> f64 {
        ratio(self.conflict, self.no_conflict)
    }

    /// Re-derives the verdict from the stored medians with other margins.
    #[must_use]
    pub fn rejudge(&self, thresholds: &Thresholds) -> Self {
        classify(self.hit, self.no_conflict, self.conflict, thresholds)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        f64::INFINITY
    } else {
        num as f64 / den as f64
    }
}

/// Classifies the three medians.
#[allow(clippy::cast_precision_loss)]
pub fn classify(hit: u64, no_conflict: u64, conflict: u64, thresholds: &Thresholds) -> Classification {
    let (h, n, c) = (hit as f64, no_conflict as f64, conflict as f64);

    let over_hit = c > h * thresholds.open_margin;
    let over_no_conflict = c > n * thresholds.open_margin;

    let verdict = if over_hit && over_no_conflict {
        Verdict::OpenRow
    } else if (h - n).abs() < thresholds.hit_tolerance * h
        && (c - h).abs() < thresholds.conflict_tolerance * h
    {
        Verdict::ClosedRow
    } else if over_hit != over_no_conflict {
        Verdict::Adaptive
    } else {
        Verdict::Inconclusive
    };

    Classification {
        verdict,
        hit,
        no_conflict,
        conflict,
        thresholds: *thresholds,
    }
}
