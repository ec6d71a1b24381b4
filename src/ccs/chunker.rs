//! Streaming chunk builder.
//!
//! Consumes subreads in the flat, ZMW-contiguous order the input delivers
//! them and turns them into per-ZMW chunks. Admission is decided once per
//! ZMW at the identity boundary (whitelist, chemistry, SNR); individual
//! subreads are then filtered by read accuracy. A chunk is only viable once
//! it has `min_passes` reads; sub-viable chunks are dropped and counted.

use crate::ccs::results::ResultCounts;
use crate::ccs::settings::ConsensusSettings;
use crate::ccs::types::{Chunk, Interval, ReadId, Snr, Subread, SubreadData};
use crate::ccs::whitelist::Whitelist;
use log::{debug, info};
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

pub struct ChunkBuilder {
    settings: ConsensusSettings,
    whitelist: Option<Whitelist>,
    /// Interned movie names, shared by every ReadId from the same movie.
    movies: HashMap<String, Arc<str>>,
    current_zmw: Option<(Arc<str>, i32)>,
    skip_current: bool,
    open: Option<Chunk>,
    batch: Vec<Chunk>,
    poor_snr: u64,
    too_few_passes: u64,
    invalid_chemistry: u64,
}

impl ChunkBuilder {
    pub fn new(settings: ConsensusSettings, whitelist: Option<Whitelist>) -> Self {
        Self {
            settings,
            whitelist,
            movies: HashMap::new(),
            current_zmw: None,
            skip_current: false,
            open: None,
            batch: Vec::new(),
            poor_snr: 0,
            too_few_passes: 0,
            invalid_chemistry: 0,
        }
    }

    /// Feeds one decoded record. Returns a batch of viable chunks when the
    /// submission granularity is reached, at a ZMW boundary.
    pub fn process(&mut self, read: SubreadData) -> Option<Vec<Chunk>> {
        let movie = self.intern_movie(&read.movie);
        let mut ready = None;

        let boundary = self
            .current_zmw
            .as_ref()
            .map_or(true, |(m, h)| **m != *read.movie || *h != read.hole_number);
        if boundary {
            self.close_open_chunk();
            if self.batch.len() >= self.settings.chunk_size {
                ready = Some(mem::take(&mut self.batch));
            }
            self.current_zmw = Some((Arc::clone(&movie), read.hole_number));
            self.skip_current = !self.admit_zmw(&movie, &read);
        }

        if !self.skip_current {
            self.append_read(movie, read);
        }
        ready
    }

    /// Closes the final open chunk and flushes whatever is batched.
    pub fn finish(&mut self) -> Option<Vec<Chunk>> {
        self.close_open_chunk();
        self.current_zmw = None;
        if self.batch.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.batch))
        }
    }

    /// Builder-level rejection counters, merged into the final tally.
    pub fn counts(&self) -> ResultCounts {
        ResultCounts {
            poor_snr: self.poor_snr,
            too_few_passes: self.too_few_passes,
            invalid_chemistry: self.invalid_chemistry,
            ..ResultCounts::default()
        }
    }

    fn intern_movie(&mut self, movie: &str) -> Arc<str> {
        match self.movies.get(movie) {
            Some(interned) => Arc::clone(interned),
            None => {
                info!("processing movie {}", movie);
                let interned: Arc<str> = Arc::from(movie);
                self.movies.insert(movie.to_string(), Arc::clone(&interned));
                interned
            }
        }
    }

    /// ZMW-level admission, evaluated once at the identity boundary.
    fn admit_zmw(&mut self, movie: &Arc<str>, read: &SubreadData) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(movie, read.hole_number) {
                return false;
            }
        }
        if !read.chemistry_ok {
            debug!(
                "skipping ZMW {}/{}, invalid chemistry (not P6/C4)",
                movie, read.hole_number
            );
            self.invalid_chemistry += 1;
            return false;
        }
        let snr = Snr::from(read.snr);
        if snr.min() < self.settings.min_snr {
            debug!(
                "skipping ZMW {}/{}, fails SNR threshold ({})",
                movie, read.hole_number, self.settings.min_snr
            );
            self.poor_snr += 1;
            return false;
        }
        self.open = Some(Chunk::new(
            ReadId::zmw(Arc::clone(movie), read.hole_number),
            snr,
        ));
        true
    }

    fn append_read(&mut self, movie: Arc<str>, read: SubreadData) {
        if read.read_accuracy < self.settings.min_read_score {
            // Below-accuracy reads are excluded silently; the ZMW can still
            // reach viability on its remaining reads.
            debug!(
                "skipping read {}/{}/{}_{}, insufficient read accuracy ({} < {})",
                movie,
                read.hole_number,
                read.query_start,
                read.query_end,
                read.read_accuracy,
                self.settings.min_read_score
            );
            return;
        }
        if let Some(chunk) = self.open.as_mut() {
            chunk.reads.push(Subread {
                id: ReadId::subread(
                    movie,
                    read.hole_number,
                    Interval::new(read.query_start, read.query_end),
                ),
                seq: read.seq,
                local_context_flags: read.local_context_flags,
                read_accuracy: read.read_accuracy,
            });
        }
    }

    fn close_open_chunk(&mut self) {
        if let Some(chunk) = self.open.take() {
            if chunk.reads.len() < self.settings.min_passes {
                debug!(
                    "skipping ZMW {}, insufficient number of passes ({} < {})",
                    chunk.id,
                    chunk.reads.len(),
                    self.settings.min_passes
                );
                self.too_few_passes += 1;
            } else {
                self.batch.push(chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(min_passes: usize) -> ConsensusSettings {
        ConsensusSettings {
            min_snr: 4.0,
            min_read_score: 0.75,
            min_passes,
            chunk_size: 1,
            ..ConsensusSettings::default()
        }
    }

    fn read(hole: i32, start: i32) -> SubreadData {
        SubreadData {
            movie: "m1".to_string(),
            hole_number: hole,
            query_start: start,
            query_end: start + 100,
            seq: b"ACGTACGT".to_vec(),
            local_context_flags: 0x3,
            read_accuracy: 0.9,
            snr: [8.0, 8.0, 8.0, 8.0],
            chemistry_ok: true,
        }
    }

    fn drain(builder: &mut ChunkBuilder, reads: Vec<SubreadData>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for r in reads {
            if let Some(batch) = builder.process(r) {
                chunks.extend(batch);
            }
        }
        if let Some(batch) = builder.finish() {
            chunks.extend(batch);
        }
        chunks
    }

    #[test]
    fn groups_by_zmw_and_drops_sub_viable_chunks() {
        // ZMWs A,A,A,B,B,C with min_passes = 2: C is dropped and counted.
        let mut builder = ChunkBuilder::new(settings(2), None);
        let reads = vec![
            read(1, 0),
            read(1, 100),
            read(1, 200),
            read(2, 0),
            read(2, 100),
            read(3, 0),
        ];

        let chunks = drain(&mut builder, reads);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id.hole_number, 1);
        assert_eq!(chunks[0].reads.len(), 3);
        assert_eq!(chunks[1].id.hole_number, 2);
        assert_eq!(chunks[1].reads.len(), 2);
        assert_eq!(builder.counts().too_few_passes, 1);
    }

    #[test]
    fn poor_snr_zmw_is_counted_once_and_contributes_no_reads() {
        let mut builder = ChunkBuilder::new(settings(1), None);
        let mut reads = vec![read(1, 0), read(1, 100), read(1, 200)];
        for r in &mut reads {
            r.snr = [8.0, 3.0, 8.0, 8.0];
        }
        reads.push(read(2, 0));

        let chunks = drain(&mut builder, reads);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id.hole_number, 2);
        assert_eq!(builder.counts().poor_snr, 1);
        assert_eq!(builder.counts().too_few_passes, 0);
    }

    #[test]
    fn invalid_chemistry_is_counted_and_skipped() {
        let mut builder = ChunkBuilder::new(settings(1), None);
        let mut bad = read(1, 0);
        bad.chemistry_ok = false;
        let chunks = drain(&mut builder, vec![bad, read(2, 0)]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(builder.counts().invalid_chemistry, 1);
    }

    #[test]
    fn low_accuracy_reads_are_dropped_silently() {
        let mut builder = ChunkBuilder::new(settings(2), None);
        let mut low = read(1, 100);
        low.read_accuracy = 0.5;
        let chunks = drain(&mut builder, vec![read(1, 0), low, read(1, 200)]);

        // Still viable on the two remaining reads, and no counter moved.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].reads.len(), 2);
        assert_eq!(builder.counts(), ResultCounts::default());
    }

    #[test]
    fn accuracy_filter_can_make_a_chunk_sub_viable() {
        let mut builder = ChunkBuilder::new(settings(2), None);
        let mut low = read(1, 100);
        low.read_accuracy = 0.5;
        let chunks = drain(&mut builder, vec![read(1, 0), low]);

        assert!(chunks.is_empty());
        assert_eq!(builder.counts().too_few_passes, 1);
    }

    #[test]
    fn whitelist_exclusions_are_silent() {
        let whitelist = Whitelist::parse("2").unwrap();
        let mut builder = ChunkBuilder::new(settings(1), Some(whitelist));
        let chunks = drain(&mut builder, vec![read(1, 0), read(2, 0)]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id.hole_number, 2);
        assert_eq!(builder.counts(), ResultCounts::default());
    }

    #[test]
    fn movie_change_is_a_zmw_boundary_even_with_equal_hole_numbers() {
        let mut builder = ChunkBuilder::new(settings(1), None);
        let mut other = read(1, 0);
        other.movie = "m2".to_string();
        let chunks = drain(&mut builder, vec![read(1, 0), other]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(&*chunks[0].id.movie, "m1");
        assert_eq!(&*chunks[1].id.movie, "m2");
    }

    #[test]
    fn chunk_size_batches_submissions() {
        let mut settings = settings(1);
        settings.chunk_size = 2;
        let mut builder = ChunkBuilder::new(settings, None);

        let mut batches = Vec::new();
        for r in vec![read(1, 0), read(2, 0), read(3, 0), read(4, 0), read(5, 0)] {
            if let Some(batch) = builder.process(r) {
                batches.push(batch);
            }
        }
        if let Some(batch) = builder.finish() {
            batches.push(batch);
        }

        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn movie_names_are_interned_and_shared() {
        let mut builder = ChunkBuilder::new(settings(1), None);
        let chunks = drain(&mut builder, vec![read(1, 0), read(2, 0)]);
        assert!(Arc::ptr_eq(&chunks[0].id.movie, &chunks[1].id.movie));
    }
}
