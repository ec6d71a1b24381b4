//! Core data model: read identities, subreads and per-ZMW chunks.

use std::fmt;
use std::sync::Arc;

/// Local context flag bits carried on PacBio subreads (`cx` tag).
pub const ADAPTER_BEFORE: u8 = 0x1;
pub const ADAPTER_AFTER: u8 = 0x2;

/// Half-open query interval of a subread within its polymerase read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i32,
    pub end: i32,
}

impl Interval {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }
}

/// Identity of a read or chunk: movie, hole number, and for individual
/// subreads the query interval. Movie names are interned once per movie and
/// shared by reference count; they are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadId {
    pub movie: Arc<str>,
    pub hole_number: i32,
    pub interval: Option<Interval>,
}

impl ReadId {
    pub fn zmw(movie: Arc<str>, hole_number: i32) -> Self {
        Self {
            movie,
            hole_number,
            interval: None,
        }
    }

    pub fn subread(movie: Arc<str>, hole_number: i32, interval: Interval) -> Self {
        Self {
            movie,
            hole_number,
            interval: Some(interval),
        }
    }
}

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.interval {
            Some(iv) => write!(
                f,
                "{}/{}/{}_{}",
                self.movie, self.hole_number, iv.start, iv.end
            ),
            None => write!(f, "{}/{}", self.movie, self.hole_number),
        }
    }
}

/// Per-channel signal-to-noise estimate for one ZMW.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snr {
    pub a: f32,
    pub c: f32,
    pub g: f32,
    pub t: f32,
}

impl Snr {
    pub fn min(&self) -> f32 {
        self.a.min(self.c).min(self.g).min(self.t)
    }

    pub fn to_vec(self) -> Vec<f32> {
        vec![self.a, self.c, self.g, self.t]
    }
}

impl From<[f32; 4]> for Snr {
    fn from(v: [f32; 4]) -> Self {
        Snr {
            a: v[0],
            c: v[1],
            g: v[2],
            t: v[3],
        }
    }
}

/// One subread admitted into a chunk. Immutable once built.
#[derive(Debug, Clone)]
pub struct Subread {
    pub id: ReadId,
    pub seq: Vec<u8>,
    pub local_context_flags: u8,
    pub read_accuracy: f32,
}

impl Subread {
    /// A full pass is flanked by adapter hits on both sides.
    pub fn is_full_pass(&self) -> bool {
        self.local_context_flags & (ADAPTER_BEFORE | ADAPTER_AFTER)
            == (ADAPTER_BEFORE | ADAPTER_AFTER)
    }
}

/// All admitted subreads for one ZMW, submitted as a single unit of work.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ReadId,
    pub reads: Vec<Subread>,
    pub snr: Snr,
}

impl Chunk {
    pub fn new(id: ReadId, snr: Snr) -> Self {
        Self {
            id,
            reads: Vec::new(),
            snr,
        }
    }
}

/// A decoded input record, before any admission decision. This is the unit
/// the chunk builder consumes; BAM decoding lives in `ccs::reader`.
#[derive(Debug, Clone)]
pub struct SubreadData {
    pub movie: String,
    pub hole_number: i32,
    pub query_start: i32,
    pub query_end: i32,
    pub seq: Vec<u8>,
    pub local_context_flags: u8,
    pub read_accuracy: f32,
    pub snr: [f32; 4],
    /// Result of the chemistry predicate on this record's read group,
    /// evaluated once per read group at header time.
    pub chemistry_ok: bool,
}

/// Read-group metadata extracted from an input BAM header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadGroupInfo {
    pub id: String,
    pub movie: String,
    pub read_type: String,
    pub binding_kit: String,
    pub sequencing_kit: String,
    pub basecaller_version: String,
    pub frame_rate_hz: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_id_display_with_and_without_interval() {
        let movie: Arc<str> = Arc::from("m54006_160504_020705");
        let zmw = ReadId::zmw(Arc::clone(&movie), 42);
        assert_eq!(zmw.to_string(), "m54006_160504_020705/42");

        let sr = ReadId::subread(movie, 42, Interval::new(0, 100));
        assert_eq!(sr.to_string(), "m54006_160504_020705/42/0_100");
    }

    #[test]
    fn snr_min_is_channel_minimum() {
        let snr = Snr::from([6.0, 4.5, 9.1, 5.2]);
        assert_eq!(snr.min(), 4.5);
    }

    #[test]
    fn full_pass_requires_both_adapters() {
        let mut read = Subread {
            id: ReadId::zmw(Arc::from("m"), 1),
            seq: b"ACGT".to_vec(),
            local_context_flags: ADAPTER_BEFORE,
            read_accuracy: 0.9,
        };
        assert!(!read.is_full_pass());
        read.local_context_flags |= ADAPTER_AFTER;
        assert!(read.is_full_pass());
    }
}
