//! Filter and dispatch configuration shared by the chunk builder and the
//! consensus engine.

#[derive(Debug, Clone)]
pub struct ConsensusSettings {
    /// Minimum per-channel SNR for a ZMW to be admitted.
    pub min_snr: f32,
    /// Minimum read accuracy for a subread to be kept (0..1).
    pub min_read_score: f32,
    /// Minimum subreads per ZMW for a chunk to be viable.
    pub min_passes: usize,
    /// Minimum insert length for consensus calling.
    pub min_length: usize,
    /// Consensus records below this predicted accuracy are rejected.
    pub min_predicted_accuracy: f32,
    /// Number of chunks batched into one work-queue submission.
    pub chunk_size: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            min_snr: 4.0,
            min_read_score: 0.75,
            min_passes: 3,
            min_length: 10,
            min_predicted_accuracy: 0.9,
            chunk_size: 1,
        }
    }
}

/// Resolves a user-supplied thread count: 0 means autodetect, anything else
/// is clamped to the available parallelism.
pub fn resolve_thread_count(requested: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if requested == 0 {
        available
    } else {
        requested.min(available).max(1)
    }
}
