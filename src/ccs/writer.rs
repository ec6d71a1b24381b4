//! Record Store output boundary: the consensus BAM, its header, and the
//! optional sidecar index. Records land on disk in exactly the order the
//! work queue delivers them.

use crate::ccs::reader::InputReadGroups;
use crate::ccs::results::{ConsensusRead, Results};
use anyhow::{Context, Result};
use rust_htslib::bam::{self, header::HeaderRecord, record::Aux};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PROGRAM_NAME: &str = "zmw-ccs";

/// Read-group ID for a movie's CCS output: first eight hex digits of the
/// digest over `movie//CCS`, stable across runs.
pub fn make_read_group_id(movie: &str) -> String {
    let digest = Sha256::digest(format!("{}//CCS", movie).as_bytes());
    let mut id = String::with_capacity(8);
    for byte in &digest[..4] {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

/// Builds the output header: @HD, a @PG entry for this run, and one CCS
/// read group per distinct input movie (deduplicated across input files).
pub fn prepare_header(command_line: &str, inputs: &[InputReadGroups]) -> bam::Header {
    let mut header = bam::Header::new();

    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", "1.5").push_tag(b"SO", "unknown");
    header.push_record(&hd);

    let mut pg = HeaderRecord::new(b"PG");
    pg.push_tag(b"ID", format!("{}-{}", PROGRAM_NAME, env!("CARGO_PKG_VERSION")))
        .push_tag(b"PN", PROGRAM_NAME)
        .push_tag(b"VN", env!("CARGO_PKG_VERSION"))
        .push_tag(b"CL", command_line);
    header.push_record(&pg);

    // BTreeMap for a deterministic read-group order in the header.
    let mut movies = BTreeMap::new();
    for input in inputs {
        for rg in input.groups() {
            movies.entry(rg.movie.clone()).or_insert_with(|| rg.clone());
        }
    }
    for (movie, rg) in movies {
        let mut record = HeaderRecord::new(b"RG");
        record
            .push_tag(b"ID", make_read_group_id(&movie))
            .push_tag(b"PL", "PACBIO")
            .push_tag(b"PU", &movie)
            .push_tag(
                b"DS",
                format!(
                    "READTYPE=CCS;BINDINGKIT={};SEQUENCINGKIT={};BASECALLERVERSION={};FRAMERATEHZ={}",
                    rg.binding_kit, rg.sequencing_kit, rg.basecaller_version, rg.frame_rate_hz
                ),
            );
        header.push_record(&record);
    }
    header
}

/// Sidecar index: one row per output record, appended in write order.
struct IndexWriter {
    out: BufWriter<File>,
    ordinal: u64,
}

impl IndexWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create index file '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "#ordinal\tqname\thole_number\tnum_passes")?;
        Ok(Self { out, ordinal: 0 })
    }

    fn add_record(&mut self, name: &str, ccs: &ConsensusRead) -> Result<()> {
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}",
            self.ordinal, name, ccs.id.hole_number, ccs.num_passes
        )?;
        self.ordinal += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }
}

/// Single-threaded consumer side of the pipeline: serializes delivered
/// results into the BAM (and index) without reordering across deliveries.
pub struct CcsWriter {
    bam: bam::Writer,
    index: Option<IndexWriter>,
}

impl CcsWriter {
    pub fn create(path: &Path, header: &bam::Header, with_index: bool) -> Result<Self> {
        let bam = bam::Writer::from_path(path, header, bam::Format::Bam)
            .with_context(|| format!("cannot create output file '{}'", path.display()))?;
        let index = if with_index {
            let mut index_path = path.as_os_str().to_owned();
            index_path.push(".ccs.idx");
            Some(IndexWriter::create(Path::new(&index_path))?)
        } else {
            None
        };
        Ok(Self { bam, index })
    }

    /// Persists one delivered result set: one record per successful
    /// consensus, nothing for failures.
    pub fn write(&mut self, results: &Results) -> Result<()> {
        for ccs in &results.records {
            let name = format!("{}/{}/ccs", ccs.id.movie, ccs.id.hole_number);
            let record = build_record(&name, ccs)?;
            self.bam
                .write(&record)
                .with_context(|| format!("failed to write record '{}'", name))?;
            if let Some(index) = self.index.as_mut() {
                index.add_record(&name, ccs)?;
            }
        }
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
        }
        Ok(())
    }
}

fn build_record(name: &str, ccs: &ConsensusRead) -> Result<bam::Record> {
    let mut record = bam::Record::new();
    record.set(name.as_bytes(), None, &ccs.sequence, &ccs.qualities);
    record.set_tid(-1);
    record.set_pos(-1);
    record.set_mtid(-1);
    record.set_mpos(-1);
    record.set_insert_size(0);
    record.set_mapq(255);
    record.set_unmapped();

    let rg_id = make_read_group_id(&ccs.id.movie);
    record.push_aux(b"RG", Aux::String(&rg_id))?;
    record.push_aux(b"zm", Aux::I32(ccs.id.hole_number))?;
    record.push_aux(b"np", Aux::I32(ccs.num_passes as i32))?;
    record.push_aux(b"rq", Aux::Float(ccs.predicted_accuracy))?;
    let snr = ccs.snr.to_vec();
    record.push_aux(b"sn", Aux::ArrayFloat((&snr).into()))?;
    record.push_aux(b"za", Aux::Float(ccs.avg_zscore))?;
    record.push_aux(b"zs", Aux::ArrayFloat((&ccs.z_scores).into()))?;
    record.push_aux(b"rs", Aux::ArrayI32((&ccs.status_counts).into()))?;
    Ok(record)
}
