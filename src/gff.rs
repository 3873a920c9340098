//! Collapsed-transcript GFF: one `transcript` line per record followed by
//! its `exon` lines, 1-based inclusive coordinates.
use crate::error::{Error, Result};
use crate::exon_chain::{ExonChain, Interval, Strand};
use crate::io_utils::open_input;
use std::cmp::Ordering;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const SOURCE: &str = "PacBio";

/// A collapsed transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedRecord {
    pub id: String,
    pub ref_id: String,
    pub strand: Strand,
    pub exons: ExonChain,
    /// Number of raw alignments collapsed into this record (0 when unknown)
    pub support: usize,
}

impl CollapsedRecord {
    pub fn start(&self) -> u64 {
        self.exons.start()
    }

    pub fn end(&self) -> u64 {
        self.exons.end()
    }

    /// `PB.3` for `PB.3.2`
    pub fn gene_id(&self) -> &str {
        self.id.rsplit_once('.').map(|(gene, _)| gene).unwrap_or(&self.id)
    }
}

/// Numeric parts of an id like `PB.12.3`, used for natural ordering
pub fn id_numbers(id: &str) -> Vec<u64> {
    id.split('.').filter_map(|part| part.parse().ok()).collect()
}

/// Order ids by their numeric components (`PB.2.1` < `PB.10.1`), then text
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    id_numbers(a).cmp(&id_numbers(b)).then_with(|| a.cmp(b))
}

pub struct GffWriter<W: Write> {
    writer: W,
}

impl<W: Write> GffWriter<W> {
    pub fn new(writer: W) -> Self {
        GffWriter { writer }
    }

    pub fn write_record(&mut self, record: &CollapsedRecord) -> std::io::Result<()> {
        let gene_id = record.gene_id();
        let attributes = format!("gene_id \"{}\"; transcript_id \"{}\";", gene_id, record.id);
        writeln!(
            self.writer,
            "{}\t{}\ttranscript\t{}\t{}\t{}\t{}\t.\t{}",
            record.ref_id,
            SOURCE,
            record.start() + 1,
            record.end(),
            record.support,
            record.strand,
            attributes
        )?;
        for exon in record.exons.exons() {
            writeln!(
                self.writer,
                "{}\t{}\texon\t{}\t{}\t.\t{}\t.\t{}",
                record.ref_id,
                SOURCE,
                exon.start + 1,
                exon.end,
                record.strand,
                attributes
            )?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn attribute<'a>(attributes: &'a str, key: &str) -> Option<&'a str> {
    attributes
        .split(';')
        .map(str::trim)
        .filter_map(|kv| kv.split_once(' '))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim().trim_matches('"'))
}

struct PendingRecord {
    id: String,
    ref_id: String,
    strand: Strand,
    support: usize,
    exons: Vec<Interval>,
    line: usize,
}

impl PendingRecord {
    fn finish(mut self, path: &Path) -> Result<CollapsedRecord> {
        self.exons.sort_by_key(|e| e.start);
        let exons = ExonChain::new(self.exons)
            .map_err(|e| Error::parse(path, self.line, format!("transcript {}: {}", self.id, e)))?;
        Ok(CollapsedRecord {
            id: self.id,
            ref_id: self.ref_id,
            strand: self.strand,
            exons,
            support: self.support,
        })
    }
}

/// Read collapsed records from a GFF stream
pub fn read_collapsed_gff_from<R: BufRead>(reader: R, path: &Path) -> Result<Vec<CollapsedRecord>> {
    let mut records = Vec::new();
    let mut pending: Option<PendingRecord> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.map_err(|e| Error::io(e, path))?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(Error::parse(path, line_number, "GFF line has fewer than 9 fields"));
        }
        let start: u64 = fields[3]
            .parse()
            .map_err(|_| Error::parse(path, line_number, format!("invalid start '{}'", fields[3])))?;
        let end: u64 = fields[4]
            .parse()
            .map_err(|_| Error::parse(path, line_number, format!("invalid end '{}'", fields[4])))?;
        if start == 0 {
            return Err(Error::parse(path, line_number, "GFF coordinates are 1-based"));
        }
        let strand = fields[6]
            .chars()
            .next()
            .and_then(Strand::from_char)
            .ok_or_else(|| Error::parse(path, line_number, format!("invalid strand '{}'", fields[6])))?;
        let transcript_id = attribute(fields[8], "transcript_id")
            .ok_or_else(|| Error::parse(path, line_number, "missing transcript_id attribute"))?;

        match fields[2] {
            "transcript" => {
                if let Some(done) = pending.take() {
                    records.push(done.finish(path)?);
                }
                pending = Some(PendingRecord {
                    id: transcript_id.to_string(),
                    ref_id: fields[0].to_string(),
                    strand,
                    support: fields[5].parse().unwrap_or(0),
                    exons: Vec::new(),
                    line: line_number,
                });
            }
            "exon" => match pending.as_mut() {
                Some(current) if current.id == transcript_id => {
                    current.exons.push(Interval::new(start - 1, end));
                }
                _ => {
                    return Err(Error::parse(
                        path,
                        line_number,
                        format!("exon of {transcript_id} does not follow its transcript line"),
                    ))
                }
            },
            _ => {} // other feature types are not part of the collapsed model
        }
    }

    if let Some(done) = pending.take() {
        records.push(done.finish(path)?);
    }
    Ok(records)
}

/// Read collapsed records from a GFF file
pub fn read_collapsed_gff<P: AsRef<Path>>(path: P) -> Result<Vec<CollapsedRecord>> {
    let path = path.as_ref();
    let input = open_input(path)?;
    read_collapsed_gff_from(input, path)
}

/// Fail on repeated transcript ids
pub fn check_unique_ids(records: &[CollapsedRecord], path: impl Into<PathBuf>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for r in records {
        if !seen.insert(r.id.as_str()) {
            return Err(Error::DuplicateId {
                id: r.id.clone(),
                path: path.into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(id: &str, exons: &[(u64, u64)]) -> CollapsedRecord {
        CollapsedRecord {
            id: id.to_string(),
            ref_id: "chr1".to_string(),
            strand: Strand::Reverse,
            exons: ExonChain::new(exons.iter().map(|&(s, e)| Interval::new(s, e)).collect()).unwrap(),
            support: 3,
        }
    }

    #[test]
    fn test_write_then_read() {
        let records = vec![
            record("PB.1.1", &[(99, 200), (299, 400)]),
            record("PB.1.2", &[(149, 400)]),
        ];
        let mut writer = GffWriter::new(Vec::new());
        for r in &records {
            writer.write_record(r).unwrap();
        }
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert!(text.starts_with(
            "chr1\tPacBio\ttranscript\t100\t400\t3\t-\t.\tgene_id \"PB.1\"; transcript_id \"PB.1.1\";\n"
        ));

        let parsed = read_collapsed_gff_from(Cursor::new(text), Path::new("mem.gff")).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_orphan_exon_is_error() {
        let text = "chr1\tPacBio\texon\t100\t200\t.\t+\t.\tgene_id \"PB.1\"; transcript_id \"PB.1.1\";\n";
        let err = read_collapsed_gff_from(Cursor::new(text), Path::new("mem.gff")).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_id_ordering_is_numeric() {
        let mut ids = vec!["PB.10.1", "PB.2.3", "PB.2.10", "PB.2.2"];
        ids.sort_by(|a, b| compare_ids(a, b));
        assert_eq!(ids, vec!["PB.2.2", "PB.2.3", "PB.2.10", "PB.10.1"]);
    }
}
