//! Record Store input boundary: subread BAM headers and records.
//!
//! Header parsing pulls the PacBio read-group metadata (movie, kits,
//! basecaller) out of the `@RG` lines; record decoding turns a `bam::Record`
//! into the flat `SubreadData` the chunk builder consumes. Anything
//! malformed here is an infrastructure fault and aborts the run.

use crate::ccs::chemistry;
use crate::ccs::types::{ReadGroupInfo, SubreadData};
use anyhow::{anyhow, bail, Context, Result};
use rust_htslib::bam::{self, record::Aux};
use std::collections::HashMap;

/// Read groups of one input file, keyed by `@RG` ID, with the chemistry
/// predicate pre-evaluated per group.
pub struct InputReadGroups {
    groups: HashMap<String, ReadGroupInfo>,
    chemistry_ok: HashMap<String, bool>,
}

impl InputReadGroups {
    pub fn from_header(header: &bam::Header) -> Result<Self> {
        let text = String::from_utf8_lossy(&header.to_bytes()).into_owned();
        let mut groups = HashMap::new();
        let mut chemistry_ok = HashMap::new();

        for line in text.lines().filter(|l| l.starts_with("@RG")) {
            let rg = parse_read_group_line(line)?;
            if rg.read_type != "SUBREAD" {
                bail!(
                    "invalid input file, READTYPE must be SUBREAD (read group '{}')",
                    rg.id
                );
            }
            chemistry_ok.insert(rg.id.clone(), chemistry::is_supported(&rg));
            groups.insert(rg.id.clone(), rg);
        }
        if groups.is_empty() {
            bail!("input file has no read groups");
        }
        Ok(Self {
            groups,
            chemistry_ok,
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = &ReadGroupInfo> {
        self.groups.values()
    }

    fn lookup(&self, id: &str) -> Result<(&ReadGroupInfo, bool)> {
        let rg = self
            .groups
            .get(id)
            .ok_or_else(|| anyhow!("record references unknown read group '{}'", id))?;
        Ok((rg, self.chemistry_ok[id]))
    }
}

fn parse_read_group_line(line: &str) -> Result<ReadGroupInfo> {
    let mut rg = ReadGroupInfo::default();
    for field in line.split('\t').skip(1) {
        let (tag, value) = field
            .split_once(':')
            .with_context(|| format!("malformed @RG field '{}'", field))?;
        match tag {
            "ID" => rg.id = value.to_string(),
            "PU" => rg.movie = value.to_string(),
            "DS" => {
                for kv in value.split(';') {
                    let (key, val) = match kv.split_once('=') {
                        Some(pair) => pair,
                        None => continue,
                    };
                    match key {
                        "READTYPE" => rg.read_type = val.to_string(),
                        "BINDINGKIT" => rg.binding_kit = val.to_string(),
                        "SEQUENCINGKIT" => rg.sequencing_kit = val.to_string(),
                        "BASECALLERVERSION" => rg.basecaller_version = val.to_string(),
                        "FRAMERATEHZ" => rg.frame_rate_hz = val.to_string(),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    if rg.id.is_empty() {
        bail!("@RG line without an ID: '{}'", line);
    }
    Ok(rg)
}

/// Decodes one subread record. The movie comes from the read group (query
/// name as fallback), hole number and query interval from the `zm`/`qs`/`qe`
/// tags (query name as fallback), accuracy from `rq`, SNR from `sn` and
/// local context flags from `cx`.
pub fn decode_subread(
    record: &bam::Record,
    read_groups: &InputReadGroups,
) -> Result<SubreadData> {
    let qname = String::from_utf8_lossy(record.qname()).into_owned();
    let (rg, chemistry_ok) = match record.aux(b"RG") {
        Ok(Aux::String(id)) => {
            let (rg, ok) = read_groups.lookup(id)?;
            (Some(rg), ok)
        }
        _ => (None, false),
    };

    let name_parts: Vec<&str> = qname.split('/').collect();
    let movie = match rg {
        Some(rg) if !rg.movie.is_empty() => rg.movie.clone(),
        _ => name_parts
            .first()
            .filter(|m| !m.is_empty())
            .map(|m| m.to_string())
            .with_context(|| format!("cannot determine movie for read '{}'", qname))?,
    };

    let hole_number = match aux_int(record, b"zm")? {
        Some(zm) => zm,
        None => name_parts
            .get(1)
            .and_then(|p| p.parse().ok())
            .with_context(|| format!("cannot determine hole number for read '{}'", qname))?,
    };

    let (query_start, query_end) = match (aux_int(record, b"qs")?, aux_int(record, b"qe")?) {
        (Some(qs), Some(qe)) => (qs, qe),
        _ => name_parts
            .get(2)
            .and_then(|p| p.split_once('_'))
            .and_then(|(s, e)| Some((s.parse().ok()?, e.parse().ok()?)))
            .with_context(|| format!("cannot determine query interval for read '{}'", qname))?,
    };

    let read_accuracy = aux_float(record, b"rq")?
        .with_context(|| format!("read '{}' is missing the rq tag", qname))?;
    // Older basecallers report accuracy as 0..1000 rather than a fraction.
    let read_accuracy = if read_accuracy > 1.0 {
        read_accuracy / 1000.0
    } else {
        read_accuracy
    };

    let snr = aux_float_array(record, b"sn")?
        .with_context(|| format!("read '{}' is missing the sn tag", qname))?;
    let local_context_flags = aux_int(record, b"cx")?.unwrap_or(0) as u8;

    Ok(SubreadData {
        movie,
        hole_number,
        query_start,
        query_end,
        seq: record.seq().as_bytes(),
        local_context_flags,
        read_accuracy,
        snr,
        chemistry_ok,
    })
}

fn aux_int(record: &bam::Record, tag: &[u8]) -> Result<Option<i32>> {
    match record.aux(tag) {
        Ok(Aux::I8(v)) => Ok(Some(v as i32)),
        Ok(Aux::U8(v)) => Ok(Some(v as i32)),
        Ok(Aux::I16(v)) => Ok(Some(v as i32)),
        Ok(Aux::U16(v)) => Ok(Some(v as i32)),
        Ok(Aux::I32(v)) => Ok(Some(v)),
        Ok(Aux::U32(v)) => Ok(Some(v as i32)),
        Ok(other) => bail!(
            "tag {} has unexpected type {:?}",
            String::from_utf8_lossy(tag),
            other
        ),
        Err(_) => Ok(None),
    }
}

fn aux_float(record: &bam::Record, tag: &[u8]) -> Result<Option<f32>> {
    match record.aux(tag) {
        Ok(Aux::Float(v)) => Ok(Some(v)),
        Ok(Aux::Double(v)) => Ok(Some(v as f32)),
        Ok(Aux::I8(v)) => Ok(Some(v as f32)),
        Ok(Aux::U8(v)) => Ok(Some(v as f32)),
        Ok(Aux::I16(v)) => Ok(Some(v as f32)),
        Ok(Aux::U16(v)) => Ok(Some(v as f32)),
        Ok(Aux::I32(v)) => Ok(Some(v as f32)),
        Ok(Aux::U32(v)) => Ok(Some(v as f32)),
        Ok(other) => bail!(
            "tag {} has unexpected type {:?}",
            String::from_utf8_lossy(tag),
            other
        ),
        Err(_) => Ok(None),
    }
}

fn aux_float_array(record: &bam::Record, tag: &[u8]) -> Result<Option<[f32; 4]>> {
    match record.aux(tag) {
        Ok(Aux::ArrayFloat(values)) => {
            let v: Vec<f32> = values.iter().collect();
            if v.len() == 4 {
                Ok(Some([v[0], v[1], v[2], v[3]]))
            } else {
                bail!(
                    "tag {} has {} values, expected 4",
                    String::from_utf8_lossy(tag),
                    v.len()
                );
            }
        }
        Ok(other) => bail!(
            "tag {} has unexpected type {:?}",
            String::from_utf8_lossy(tag),
            other
        ),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::header::HeaderRecord;

    fn test_read_groups() -> InputReadGroups {
        let mut header = bam::Header::new();
        let mut rg = HeaderRecord::new(b"RG");
        rg.push_tag(b"ID", "rg1")
            .push_tag(b"PU", "m1")
            .push_tag(
                b"DS",
                "READTYPE=SUBREAD;BINDINGKIT=100356300;SEQUENCINGKIT=100356200;BASECALLERVERSION=2.1.0.0;FRAMERATEHZ=75.0",
            );
        header.push_record(&rg);
        InputReadGroups::from_header(&header).unwrap()
    }

    fn subread_record(sn: &[f32]) -> bam::Record {
        let mut record = bam::Record::new();
        record.set(b"m1/42/0_4", None, b"ACGT", &[30, 30, 30, 30]);
        record.push_aux(b"RG", Aux::String("rg1")).unwrap();
        record.push_aux(b"zm", Aux::I32(42)).unwrap();
        record.push_aux(b"qs", Aux::I32(0)).unwrap();
        record.push_aux(b"qe", Aux::I32(4)).unwrap();
        record.push_aux(b"rq", Aux::Float(0.92)).unwrap();
        record.push_aux(b"cx", Aux::U8(3)).unwrap();
        record.push_aux(b"sn", Aux::ArrayFloat(sn.into())).unwrap();
        record
    }

    #[test]
    fn decodes_a_tagged_subread_record() {
        let read_groups = test_read_groups();
        let record = subread_record(&[6.0, 7.0, 8.0, 9.0]);

        let subread = decode_subread(&record, &read_groups).unwrap();
        assert_eq!(subread.movie, "m1");
        assert_eq!(subread.hole_number, 42);
        assert_eq!((subread.query_start, subread.query_end), (0, 4));
        assert_eq!(subread.seq, b"ACGT");
        assert_eq!(subread.local_context_flags, 3);
        assert!((subread.read_accuracy - 0.92).abs() < 1e-6);
        assert_eq!(subread.snr, [6.0, 7.0, 8.0, 9.0]);
        assert!(subread.chemistry_ok);
    }

    #[test]
    fn wrong_length_sn_is_not_reported_as_missing() {
        let read_groups = test_read_groups();
        let record = subread_record(&[6.0, 7.0, 8.0]);

        let err = decode_subread(&record, &read_groups).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("3 values, expected 4"));
        assert!(!message.contains("missing the sn tag"));
    }

    #[test]
    fn parses_pacbio_read_group_line() {
        let rg = parse_read_group_line(
            "@RG\tID:b89a4406\tPL:PACBIO\tPU:m54006_160504_020705\tDS:READTYPE=SUBREAD;BINDINGKIT=100356300;SEQUENCINGKIT=100356200;BASECALLERVERSION=2.3.0.0;FRAMERATEHZ=75.0",
        )
        .unwrap();
        assert_eq!(rg.id, "b89a4406");
        assert_eq!(rg.movie, "m54006_160504_020705");
        assert_eq!(rg.read_type, "SUBREAD");
        assert_eq!(rg.binding_kit, "100356300");
        assert_eq!(rg.sequencing_kit, "100356200");
        assert_eq!(rg.basecaller_version, "2.3.0.0");
        assert_eq!(rg.frame_rate_hz, "75.0");
    }

    #[test]
    fn read_group_line_without_id_is_an_error() {
        assert!(parse_read_group_line("@RG\tPU:m1").is_err());
    }

    #[test]
    fn malformed_rg_field_is_an_error() {
        assert!(parse_read_group_line("@RG\tID:x\tnota-tag").is_err());
    }
}
