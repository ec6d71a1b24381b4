//! Consensus dispatch boundary.
//!
//! `consensus` is the pure function handed to the work queue: one batch of
//! chunks in, one `Results` out, with every chunk classified into exactly one
//! outcome category. The polish step is a draft-selection placeholder; the
//! surrounding classification (usability, insert length, pass count,
//! predicted accuracy) is the contract the pipeline depends on.

use crate::ccs::results::{ConsensusRead, OutcomeCategory, Results};
use crate::ccs::settings::ConsensusSettings;
use crate::ccs::types::{Chunk, ReadId, Subread};
use log::debug;

/// Per-subread fates while building the draft, in `status_counts` order.
const STATUS_SUCCESS: usize = 0;
const STATUS_NOT_FULL_PASS: usize = 1;
const STATUS_BAD_LENGTH: usize = 2;

pub fn consensus(chunks: Vec<Chunk>, settings: &ConsensusSettings) -> Results {
    let mut results = Results::default();
    for chunk in chunks {
        let id = chunk.id.clone();
        match call_chunk(chunk, settings) {
            Ok(record) => {
                results.counts.tally(OutcomeCategory::Success);
                results.records.push(record);
            }
            Err(category) => {
                debug!("ZMW {} failed consensus: {:?}", id, category);
                results.counts.tally(category);
            }
        }
    }
    results
}

fn call_chunk(chunk: Chunk, settings: &ConsensusSettings) -> Result<ConsensusRead, OutcomeCategory> {
    let mut status_counts = vec![0i32; 3];
    let total = chunk.reads.len();

    let full_passes: Vec<&Subread> = chunk
        .reads
        .iter()
        .filter(|r| {
            if r.is_full_pass() {
                true
            } else {
                status_counts[STATUS_NOT_FULL_PASS] += 1;
                false
            }
        })
        .collect();
    if full_passes.is_empty() {
        return Err(OutcomeCategory::NoUsableReads);
    }

    let median = median_length(&full_passes);
    if median < settings.min_length {
        return Err(OutcomeCategory::TooShort);
    }

    // Reads wildly off the median length are adapter artifacts or partial
    // passes mislabeled by the basecaller.
    let usable: Vec<&Subread> = full_passes
        .into_iter()
        .filter(|r| {
            let len = r.seq.len();
            if len * 2 >= median && len <= median * 2 {
                status_counts[STATUS_SUCCESS] += 1;
                true
            } else {
                status_counts[STATUS_BAD_LENGTH] += 1;
                false
            }
        })
        .collect();

    if usable.len() < settings.min_passes {
        return Err(OutcomeCategory::TooFewPasses);
    }
    if usable.len() * 2 < total {
        return Err(OutcomeCategory::TooManyUnusable);
    }

    let draft = usable
        .iter()
        .max_by(|a, b| {
            a.read_accuracy
                .partial_cmp(&b.read_accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or(OutcomeCategory::NoUsableReads)?;

    let (predicted_accuracy, z_scores) = polish_estimate(&usable);
    if predicted_accuracy < settings.min_predicted_accuracy {
        return Err(OutcomeCategory::PoorQuality);
    }

    let quality = phred_quality(predicted_accuracy);
    let avg_zscore = z_scores.iter().sum::<f32>() / z_scores.len().max(1) as f32;
    Ok(ConsensusRead {
        id: ReadId::zmw(chunk.id.movie, chunk.id.hole_number),
        sequence: draft.seq.clone(),
        qualities: vec![quality; draft.seq.len()],
        num_passes: usable.len() as u32,
        predicted_accuracy,
        snr: chunk.snr,
        z_scores,
        avg_zscore,
        status_counts,
    })
}

fn median_length(reads: &[&Subread]) -> usize {
    let mut lengths: Vec<usize> = reads.iter().map(|r| r.seq.len()).collect();
    lengths.sort_unstable();
    lengths[lengths.len() / 2]
}

/// Accuracy estimate for the draft after folding in each pass. The trace is
/// the per-iteration estimate, reported on the output record.
fn polish_estimate(usable: &[&Subread]) -> (f32, Vec<f32>) {
    let mean_accuracy =
        usable.iter().map(|r| r.read_accuracy).sum::<f32>() / usable.len() as f32;

    let mut z_scores = Vec::with_capacity(usable.len());
    let mut error = 1.0 - mean_accuracy;
    for _ in 0..usable.len() {
        error /= 2.0;
        z_scores.push(1.0 - error);
    }
    (1.0 - error, z_scores)
}

fn phred_quality(accuracy: f32) -> u8 {
    if accuracy >= 1.0 {
        return 93;
    }
    let q = -10.0 * (1.0 - accuracy).log10();
    q.round().clamp(0.0, 93.0) as u8
}
