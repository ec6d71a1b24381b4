//! ZMW allow-list parsed from the `--zmws` option.
//!
//! The spec is a comma-separated list of entries. Each entry is `*`, a hole
//! number, or an inclusive `start-end` range, optionally prefixed with a
//! movie name: `m54006.../0-1000,42,other_movie/7`.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct HoleRange {
    start: i32,
    end: i32,
}

impl HoleRange {
    fn contains(&self, hole: i32) -> bool {
        self.start <= hole && hole <= self.end
    }
}

#[derive(Debug, Clone, Default)]
struct MovieRanges {
    all: bool,
    ranges: Vec<HoleRange>,
}

impl MovieRanges {
    fn contains(&self, hole: i32) -> bool {
        self.all || self.ranges.iter().any(|r| r.contains(hole))
    }
}

/// Allow-list of holes, optionally scoped per movie. Unscoped entries apply
/// to every movie.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    any_movie: MovieRanges,
    per_movie: HashMap<String, MovieRanges>,
}

impl Whitelist {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut list = Whitelist::default();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                bail!("empty entry in ZMW whitelist '{}'", spec);
            }

            let (movie, holes) = match entry.rsplit_once('/') {
                Some((movie, holes)) => (Some(movie), holes),
                None => (None, entry),
            };
            let target = match movie {
                Some(movie) => list.per_movie.entry(movie.to_string()).or_default(),
                None => &mut list.any_movie,
            };

            if holes == "*" {
                target.all = true;
                continue;
            }
            let range = match holes.split_once('-') {
                Some((start, end)) => HoleRange {
                    start: parse_hole(start, entry)?,
                    end: parse_hole(end, entry)?,
                },
                None => {
                    let hole = parse_hole(holes, entry)?;
                    HoleRange {
                        start: hole,
                        end: hole,
                    }
                }
            };
            if range.start > range.end {
                bail!("inverted range in ZMW whitelist entry '{}'", entry);
            }
            target.ranges.push(range);
        }
        Ok(list)
    }

    pub fn contains(&self, movie: &str, hole: i32) -> bool {
        self.any_movie.contains(hole)
            || self
                .per_movie
                .get(movie)
                .map_or(false, |ranges| ranges.contains(hole))
    }
}

fn parse_hole(text: &str, entry: &str) -> Result<i32> {
    text.trim()
        .parse()
        .with_context(|| format!("invalid hole number in ZMW whitelist entry '{}'", entry))
}
