use crate::error::{Error, Result};
use crate::exon_chain::{ExonChain, Interval, Strand};
use crate::io_utils::open_input;
use nom::{
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map_res},
    multi::many1,
    sequence::pair,
    IResult,
};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// One CIGAR operation: length and op code
pub type CigarOp = (u64, char);

fn cigar_op(input: &str) -> IResult<&str, CigarOp> {
    pair(map_res(digit1, |d: &str| d.parse::<u64>()), one_of("MIDNSHP=X"))(input)
}

/// Parse a CIGAR string like `10S90M500N45M` into operations
pub fn parse_cigar(cigar: &str) -> std::result::Result<Vec<CigarOp>, String> {
    all_consuming(many1(cigar_op))(cigar)
        .map(|(_, ops)| ops)
        .map_err(|e| format!("invalid CIGAR '{cigar}': {e}"))
}

/// Per-operation totals needed for coverage and identity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CigarCounts {
    pub matches: u64,
    pub exact_matches: u64,
    pub mismatches: u64,
    pub insertions: u64,
    pub deletions: u64,
    pub hard_clipped: u64,
}

impl CigarCounts {
    pub fn from_ops(ops: &[CigarOp]) -> Self {
        let mut counts = CigarCounts::default();
        for &(len, op) in ops {
            match op {
                'M' => counts.matches += len,
                '=' => counts.exact_matches += len,
                'X' => counts.mismatches += len,
                'I' => counts.insertions += len,
                'D' => counts.deletions += len,
                'H' => counts.hard_clipped += len,
                _ => {} // S, N, P
            }
        }
        counts
    }

    /// Query bases placed on the reference (excluding clips)
    pub fn aligned_query_bases(&self) -> u64 {
        self.matches + self.exact_matches + self.mismatches + self.insertions
    }

    fn columns(&self) -> u64 {
        self.aligned_query_bases() + self.deletions
    }

    /// Identity over alignment columns. `NM` counts mismatches plus indel
    /// bases; without it, `M` columns are assumed to match.
    pub fn identity(&self, edit_distance: Option<u64>) -> f64 {
        let columns = self.columns();
        if columns == 0 {
            return 0.0;
        }
        let errors = match edit_distance {
            Some(nm) => nm,
            None => self.mismatches + self.insertions + self.deletions,
        };
        1.0 - errors.min(columns) as f64 / columns as f64
    }
}

/// Walk the CIGAR along the reference and build exon blocks. `N` splits
/// exons; `D` stays inside the current exon.
pub fn exons_from_cigar(ref_start: u64, ops: &[CigarOp]) -> std::result::Result<ExonChain, String> {
    let mut exons = Vec::new();
    let mut pos = ref_start;
    let mut block_start = ref_start;

    for &(len, op) in ops {
        match op {
            'M' | '=' | 'X' | 'D' => pos += len,
            'N' => {
                if pos > block_start {
                    exons.push(Interval::new(block_start, pos));
                }
                pos += len;
                block_start = pos;
            }
            _ => {}
        }
    }
    if pos > block_start {
        exons.push(Interval::new(block_start, pos));
    }
    ExonChain::new(exons)
}

/// A mapped alignment of one isoform to the reference
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub query_id: String,
    pub ref_id: String,
    pub strand: Strand,
    pub exons: ExonChain,
    pub query_len: u64,
    pub coverage: f64,
    pub identity: f64,
    /// 0-based position of the record among primary records in the input
    pub ordinal: usize,
}

impl AlignmentRecord {
    pub fn start(&self) -> u64 {
        self.exons.start()
    }

    pub fn end(&self) -> u64 {
        self.exons.end()
    }
}

/// A primary SAM line, mapped or not
#[derive(Debug, Clone)]
pub enum SamEntry {
    Unmapped { query_id: String, ordinal: usize },
    Mapped(AlignmentRecord),
}

impl SamEntry {
    pub fn query_id(&self) -> &str {
        match self {
            SamEntry::Unmapped { query_id, .. } => query_id,
            SamEntry::Mapped(r) => &r.query_id,
        }
    }
}

/// Streaming reader over primary SAM records
pub struct SamReader<R: BufRead> {
    reader: R,
    path: PathBuf,
    query_lengths: Option<HashMap<String, u64>>,
    line_number: usize,
    next_ordinal: usize,
}

impl<R: BufRead> SamReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        SamReader {
            reader,
            path: path.into(),
            query_lengths: None,
            line_number: 0,
            next_ordinal: 0,
        }
    }

    /// Take query lengths from the isoform file instead of the SEQ column
    pub fn with_query_lengths(mut self, lengths: HashMap<String, u64>) -> Self {
        self.query_lengths = Some(lengths);
        self
    }

    pub fn read_record(&mut self) -> Result<Option<SamEntry>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| Error::io(e, &self.path))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() || trimmed.starts_with('@') {
                continue;
            }
            if let Some(entry) = self.parse_sam_line(trimmed)? {
                return Ok(Some(entry));
            }
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> Error {
        Error::parse(&self.path, self.line_number, message)
    }

    fn parse_sam_line(&mut self, line: &str) -> Result<Option<SamEntry>> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            return Err(self.parse_error("SAM line has fewer than 11 required fields"));
        }

        let query_id = fields[0].to_string();
        let flag: u16 = fields[1]
            .parse()
            .map_err(|_| self.parse_error(format!("invalid FLAG '{}'", fields[1])))?;

        if flag & (FLAG_SECONDARY | FLAG_SUPPLEMENTARY) != 0 {
            return Ok(None);
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        if flag & FLAG_UNMAPPED != 0 || fields[2] == "*" || fields[5] == "*" {
            return Ok(Some(SamEntry::Unmapped { query_id, ordinal }));
        }

        let pos: u64 = fields[3]
            .parse()
            .map_err(|_| self.parse_error(format!("invalid POS '{}'", fields[3])))?;
        if pos == 0 {
            return Err(self.parse_error("mapped record with POS 0"));
        }
        let ops = parse_cigar(fields[5]).map_err(|e| self.parse_error(e))?;
        let exons = exons_from_cigar(pos - 1, &ops).map_err(|e| self.parse_error(e))?;
        let counts = CigarCounts::from_ops(&ops);

        let query_len = match &self.query_lengths {
            Some(lengths) => *lengths.get(&query_id).ok_or_else(|| Error::MissingId {
                id: query_id.clone(),
                context: format!("{}:{}", self.path.display(), self.line_number),
                path: PathBuf::from("isoform sequences"),
            })?,
            None => {
                let seq_len = if fields[9] == "*" { 0 } else { fields[9].len() as u64 };
                let soft_clipped: u64 = ops.iter().filter(|(_, op)| *op == 'S').map(|(l, _)| l).sum();
                // SEQ already includes soft clips; add only hard clips
                let from_cigar = counts.aligned_query_bases() + soft_clipped;
                seq_len.max(from_cigar) + counts.hard_clipped
            }
        };

        let mut edit_distance = None;
        for tag in &fields[11..] {
            if let Some(value) = tag.strip_prefix("NM:i:") {
                edit_distance = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| self.parse_error(format!("invalid NM tag '{tag}'")))?,
                );
            }
        }

        let coverage = if query_len > 0 {
            counts.aligned_query_bases() as f64 / query_len as f64
        } else {
            0.0
        };

        let strand = if flag & FLAG_REVERSE != 0 {
            Strand::Reverse
        } else {
            Strand::Forward
        };

        Ok(Some(SamEntry::Mapped(AlignmentRecord {
            query_id,
            ref_id: fields[2].to_string(),
            strand,
            exons,
            query_len,
            coverage,
            identity: counts.identity(edit_distance),
            ordinal,
        })))
    }

    pub fn read_all(&mut self) -> Result<Vec<SamEntry>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl<R: BufRead> Iterator for SamReader<R> {
    type Item = Result<SamEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Open a SAM file (auto-detects bgzip compression)
pub fn open_sam<P: AsRef<Path>>(path: P) -> Result<SamReader<Box<dyn BufRead>>> {
    let path = path.as_ref();
    let input = open_input(path)?;
    Ok(SamReader::new(input, path))
}
