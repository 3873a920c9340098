//! Groups a sorted alignment stream into loci of transitively overlapping
//! records, split by strand.
use crate::error::{Error, Result};
use crate::exon_chain::Strand;
use crate::sam::{AlignmentRecord, SamEntry};
use log::debug;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Minimum alignment quality for a record to take part in collapsing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentThresholds {
    pub min_aln_coverage: f64,
    pub min_aln_identity: f64,
}

impl Default for AlignmentThresholds {
    fn default() -> Self {
        AlignmentThresholds {
            min_aln_coverage: 0.99,
            min_aln_identity: 0.95,
        }
    }
}

/// Why a raw record was left out of collapsing
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    Unmapped,
    LowCoverage(f64),
    LowIdentity(f64),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Unmapped => write!(f, "Unmapped"),
            IgnoreReason::LowCoverage(c) => write!(f, "Coverage {c:.3} too low"),
            IgnoreReason::LowIdentity(i) => write!(f, "Identity {i:.3} too low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IgnoredRecord {
    pub query_id: String,
    pub reason: IgnoreReason,
}

/// Overlapping records on one reference
#[derive(Debug, Clone)]
pub struct Locus {
    pub ref_id: String,
    pub start: u64,
    pub end: u64,
    pub records: Vec<AlignmentRecord>,
}

impl Locus {
    /// Non-empty per-strand record lists, `+` first, each in input order
    pub fn strand_groups(self) -> Vec<(Strand, Vec<AlignmentRecord>)> {
        let (forward, reverse): (Vec<_>, Vec<_>) = self
            .records
            .into_iter()
            .partition(|r| r.strand == Strand::Forward);
        [(Strand::Forward, forward), (Strand::Reverse, reverse)]
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
            .collect()
    }
}

/// Iterator of loci over a stream of primary SAM entries.
///
/// Input must be sorted by reference then start. An out-of-order record ends
/// the iteration with `Error::UnsortedInput`.
pub struct LocusGrouper<I: Iterator<Item = Result<SamEntry>>> {
    entries: I,
    source: PathBuf,
    thresholds: AlignmentThresholds,
    current: Vec<AlignmentRecord>,
    current_end: u64,
    last: Option<(String, u64, String)>,
    finished_refs: HashSet<String>,
    seen_ids: HashSet<String>,
    ignored: Vec<IgnoredRecord>,
    done: bool,
}

impl<I: Iterator<Item = Result<SamEntry>>> LocusGrouper<I> {
    pub fn new(entries: I, source: impl Into<PathBuf>, thresholds: AlignmentThresholds) -> Self {
        LocusGrouper {
            entries,
            source: source.into(),
            thresholds,
            current: Vec::new(),
            current_end: 0,
            last: None,
            finished_refs: HashSet::new(),
            seen_ids: HashSet::new(),
            ignored: Vec::new(),
            done: false,
        }
    }

    /// Records diverted so far, in input order
    pub fn ignored(&self) -> &[IgnoredRecord] {
        &self.ignored
    }

    pub fn into_ignored(self) -> Vec<IgnoredRecord> {
        self.ignored
    }

    fn check_sorted(&mut self, record: &AlignmentRecord) -> Result<()> {
        if let Some((last_ref, last_start, last_id)) = &self.last {
            let out_of_order = if *last_ref == record.ref_id {
                record.start() < *last_start
            } else {
                self.finished_refs.contains(&record.ref_id)
            };
            if out_of_order {
                return Err(Error::UnsortedInput {
                    previous: format!("{} ({}:{})", last_id, last_ref, last_start + 1),
                    current: format!("{} ({}:{})", record.query_id, record.ref_id, record.start() + 1),
                });
            }
            if *last_ref != record.ref_id {
                self.finished_refs.insert(last_ref.clone());
            }
        }
        self.last = Some((record.ref_id.clone(), record.start(), record.query_id.clone()));
        Ok(())
    }

    fn ignore_reason(&self, record: &AlignmentRecord) -> Option<IgnoreReason> {
        if record.coverage < self.thresholds.min_aln_coverage {
            Some(IgnoreReason::LowCoverage(record.coverage))
        } else if record.identity < self.thresholds.min_aln_identity {
            Some(IgnoreReason::LowIdentity(record.identity))
        } else {
            None
        }
    }

    fn take_locus(&mut self) -> Locus {
        let records = std::mem::take(&mut self.current);
        let ref_id = records[0].ref_id.clone();
        let start = records[0].start();
        debug!(
            "Locus {}:{}-{} with {} records",
            ref_id,
            start + 1,
            self.current_end,
            records.len()
        );
        Locus {
            ref_id,
            start,
            end: self.current_end,
            records,
        }
    }

    fn step(&mut self) -> Result<Option<Locus>> {
        loop {
            let entry = match self.entries.next() {
                Some(entry) => entry?,
                None => {
                    self.done = true;
                    return Ok(if self.current.is_empty() {
                        None
                    } else {
                        Some(self.take_locus())
                    });
                }
            };

            if !self.seen_ids.insert(entry.query_id().to_string()) {
                return Err(Error::DuplicateId {
                    id: entry.query_id().to_string(),
                    path: self.source.clone(),
                });
            }

            let record = match entry {
                SamEntry::Unmapped { query_id, .. } => {
                    self.ignored.push(IgnoredRecord {
                        query_id,
                        reason: IgnoreReason::Unmapped,
                    });
                    continue;
                }
                SamEntry::Mapped(record) => record,
            };

            self.check_sorted(&record)?;
            if let Some(reason) = self.ignore_reason(&record) {
                self.ignored.push(IgnoredRecord {
                    query_id: record.query_id,
                    reason,
                });
                continue;
            }

            let extends_current = !self.current.is_empty()
                && self.current[0].ref_id == record.ref_id
                && record.start() < self.current_end;

            if self.current.is_empty() {
                self.current_end = record.end();
                self.current.push(record);
            } else if extends_current {
                self.current_end = self.current_end.max(record.end());
                self.current.push(record);
            } else {
                let locus = self.take_locus();
                self.current_end = record.end();
                self.current.push(record);
                return Ok(Some(locus));
            }
        }
    }
}

impl<I: Iterator<Item = Result<SamEntry>>> Iterator for LocusGrouper<I> {
    type Item = Result<Locus>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(locus)) => Some(Ok(locus)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
