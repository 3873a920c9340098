//! Isoform sequences (FASTA or FASTQ) used for query lengths and
//! representative selection.
use crate::error::{Error, Result};
use crate::io_utils::open_input;
use indexmap::IndexMap;
use log::info;
use noodles::{fasta, fastq};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

const PHRED_OFFSET: u8 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Fasta,
    Fastq,
}

impl SequenceFormat {
    /// Format from the file extension, looking through `.gz`/`.bgz`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let name = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".bgz"))
            .unwrap_or(&name);
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("fa" | "fasta" | "fna") => Ok(SequenceFormat::Fasta),
            Some("fq" | "fastq") => Ok(SequenceFormat::Fastq),
            _ => Err(Error::Config(format!(
                "cannot tell FASTA from FASTQ for {} (expected .fasta/.fa or .fastq/.fq)",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: Vec<u8>,
    /// Phred+33 qualities, FASTQ only
    pub quality: Option<Vec<u8>>,
}

impl SequenceRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Expected number of base errors, sum of `10^(-q/10)`
    pub fn expected_errors(&self) -> Option<f64> {
        self.quality.as_ref().map(|quals| {
            quals
                .iter()
                .map(|&q| 10f64.powf(-(q.saturating_sub(PHRED_OFFSET) as f64) / 10.0))
                .sum()
        })
    }
}

/// Isoform sequences keyed by id, in file order
pub type SequenceTable = IndexMap<String, SequenceRecord>;

fn insert_unique(table: &mut SequenceTable, record: SequenceRecord, path: &Path) -> Result<()> {
    if table.contains_key(&record.id) {
        return Err(Error::DuplicateId {
            id: record.id,
            path: path.to_path_buf(),
        });
    }
    table.insert(record.id.clone(), record);
    Ok(())
}

fn utf8_name(name: &[u8], path: &Path) -> Result<String> {
    std::str::from_utf8(name)
        .map(str::to_string)
        .map_err(|e| Error::Data {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8 in record name: {e}"),
        })
}

/// Read every record of a FASTA or FASTQ file. Ids must be unique.
pub fn read_sequences<P: AsRef<Path>>(path: P) -> Result<SequenceTable> {
    let path = path.as_ref();
    let format = SequenceFormat::from_path(path)?;
    let input = open_input(path)?;
    let mut table = SequenceTable::new();

    match format {
        SequenceFormat::Fasta => {
            let mut reader = fasta::io::Reader::new(input);
            for result in reader.records() {
                let record = result.map_err(|e| Error::io(e, path))?;
                let seq = SequenceRecord {
                    id: utf8_name(record.name(), path)?,
                    sequence: record.sequence().as_ref().to_vec(),
                    quality: None,
                };
                insert_unique(&mut table, seq, path)?;
            }
        }
        SequenceFormat::Fastq => {
            let mut reader = fastq::io::Reader::new(input);
            for result in reader.records() {
                let record = result.map_err(|e| Error::io(e, path))?;
                let seq = SequenceRecord {
                    id: utf8_name(record.name(), path)?,
                    sequence: record.sequence().to_vec(),
                    quality: Some(record.quality_scores().to_vec()),
                };
                insert_unique(&mut table, seq, path)?;
            }
        }
    }

    info!("Read {} isoform sequences from {}", table.len(), path.display());
    Ok(table)
}

/// Sequence length per id
pub fn query_lengths(table: &SequenceTable) -> HashMap<String, u64> {
    table
        .iter()
        .map(|(id, rec)| (id.clone(), rec.len() as u64))
        .collect()
}

/// Write one record under `name` in `format`.
pub fn write_sequence<W: Write>(
    writer: &mut W,
    name: &str,
    record: &SequenceRecord,
    format: SequenceFormat,
) -> std::io::Result<()> {
    match (format, &record.quality) {
        (SequenceFormat::Fastq, Some(quality)) => {
            writeln!(writer, "@{name}")?;
            writer.write_all(&record.sequence)?;
            writeln!(writer, "\n+")?;
            writer.write_all(quality)?;
            writeln!(writer)
        }
        (SequenceFormat::Fastq, None) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no qualities to write as FASTQ", record.id),
        )),
        (SequenceFormat::Fasta, _) => {
            writeln!(writer, ">{name}")?;
            writer.write_all(&record.sequence)?;
            writeln!(writer)
        }
    }
}
