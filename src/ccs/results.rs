//! Outcome categories, the mergeable result tally, and the run report.

use crate::ccs::types::{ReadId, Snr};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::ops::{Add, AddAssign};

/// Classification of one consensus attempt. Every dispatched chunk ends up in
/// exactly one category; the builder-level rejections use the same tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCategory {
    Success,
    PoorSnr,
    NoUsableReads,
    TooShort,
    TooFewPasses,
    TooManyUnusable,
    NonConvergent,
    PoorQuality,
    InvalidChemistry,
}

/// Per-category counters with a commutative, associative merge. Percentages
/// are derived from `total()` at report time only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub success: u64,
    pub poor_snr: u64,
    pub no_usable_reads: u64,
    pub too_short: u64,
    pub too_few_passes: u64,
    pub too_many_unusable: u64,
    pub non_convergent: u64,
    pub poor_quality: u64,
    pub invalid_chemistry: u64,
}

impl ResultCounts {
    pub fn tally(&mut self, category: OutcomeCategory) {
        match category {
            OutcomeCategory::Success => self.success += 1,
            OutcomeCategory::PoorSnr => self.poor_snr += 1,
            OutcomeCategory::NoUsableReads => self.no_usable_reads += 1,
            OutcomeCategory::TooShort => self.too_short += 1,
            OutcomeCategory::TooFewPasses => self.too_few_passes += 1,
            OutcomeCategory::TooManyUnusable => self.too_many_unusable += 1,
            OutcomeCategory::NonConvergent => self.non_convergent += 1,
            OutcomeCategory::PoorQuality => self.poor_quality += 1,
            OutcomeCategory::InvalidChemistry => self.invalid_chemistry += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.success
            + self.poor_snr
            + self.no_usable_reads
            + self.too_short
            + self.too_few_passes
            + self.too_many_unusable
            + self.non_convergent
            + self.poor_quality
            + self.invalid_chemistry
    }

    fn rows(&self) -> [(&'static str, u64); 9] {
        [
            ("Success -- CCS generated", self.success),
            ("Failed -- Below SNR threshold", self.poor_snr),
            ("Failed -- No usable subreads", self.no_usable_reads),
            ("Failed -- Insert size too small", self.too_short),
            ("Failed -- Not enough full passes", self.too_few_passes),
            ("Failed -- Too many unusable subreads", self.too_many_unusable),
            ("Failed -- CCS did not converge", self.non_convergent),
            (
                "Failed -- CCS below minimum predicted accuracy",
                self.poor_quality,
            ),
            ("Failed -- Invalid chemistry", self.invalid_chemistry),
        ]
    }
}

impl AddAssign for ResultCounts {
    fn add_assign(&mut self, other: Self) {
        self.success += other.success;
        self.poor_snr += other.poor_snr;
        self.no_usable_reads += other.no_usable_reads;
        self.too_short += other.too_short;
        self.too_few_passes += other.too_few_passes;
        self.too_many_unusable += other.too_many_unusable;
        self.non_convergent += other.non_convergent;
        self.poor_quality += other.poor_quality;
        self.invalid_chemistry += other.invalid_chemistry;
    }
}

impl Add for ResultCounts {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

/// One successful consensus, ready to be written out.
#[derive(Debug, Clone)]
pub struct ConsensusRead {
    pub id: ReadId,
    pub sequence: Vec<u8>,
    pub qualities: Vec<u8>,
    pub num_passes: u32,
    pub predicted_accuracy: f32,
    pub snr: Snr,
    /// Per-iteration quality trace from the engine's refinement loop, and
    /// its mean.
    pub z_scores: Vec<f32>,
    pub avg_zscore: f32,
    /// Histogram of per-subread statuses observed while building the draft.
    pub status_counts: Vec<i32>,
}

/// The work queue's result type: zero or more consensus records per batch,
/// plus the outcome tally for every chunk in the batch.
#[derive(Debug, Default)]
pub struct Results {
    pub counts: ResultCounts,
    pub records: Vec<ConsensusRead>,
}

/// Writes the delimited summary: label, absolute count, percentage of total.
pub fn write_report<W: Write>(mut out: W, counts: &ResultCounts) -> Result<()> {
    let total = counts.total().max(1);
    for (label, count) in counts.rows() {
        writeln!(
            out,
            "{},{},{:.2}%",
            label,
            count,
            100.0 * count as f64 / total as f64
        )?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct JsonReportRow {
    label: &'static str,
    count: u64,
    percent: f64,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated: String,
    total: u64,
    counts: &'a ResultCounts,
    categories: Vec<JsonReportRow>,
}

/// Structured variant of the report for downstream tooling.
pub fn write_json_report<W: Write>(out: W, counts: &ResultCounts) -> Result<()> {
    let total = counts.total();
    let denom = total.max(1);
    let report = JsonReport {
        generated: chrono::Local::now().to_rfc3339(),
        total,
        counts,
        categories: counts
            .rows()
            .into_iter()
            .map(|(label, count)| JsonReportRow {
                label,
                count,
                percent: 100.0 * count as f64 / denom as f64,
            })
            .collect(),
    };
    serde_json::to_writer_pretty(out, &report)?;
    Ok(())
}
