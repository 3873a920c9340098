//! Accumulated collapsed set across samples, folded one sample at a time.
use crate::error::{Error, Result};
use crate::exon_chain::{can_merge, MergePolicy, Strand};
use crate::gff::{check_unique_ids, compare_ids, read_collapsed_gff, CollapsedRecord, GffWriter};
use crate::group::{read_groups, read_groups_with_prefix, GroupTable, GroupWriter};
use crate::io_utils::AtomicOutput;
use crate::mega_info::{MegaInfoWriter, MergeGroupOperation};
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output files of one chaining step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStepFiles {
    pub prefix: String,
    pub gff: PathBuf,
    pub group: PathBuf,
    pub mega_info: PathBuf,
}

impl ChainStepFiles {
    /// `tmp_<sample>.*` in `out_dir`
    pub fn for_sample<P: AsRef<Path>>(out_dir: P, sample: &str) -> Self {
        let prefix = format!("tmp_{sample}");
        let base = out_dir.as_ref();
        ChainStepFiles {
            gff: base.join(format!("{prefix}.gff")),
            group: base.join(format!("{prefix}.group.txt")),
            mega_info: base.join(format!("{prefix}.mega_info.txt")),
            prefix,
        }
    }
}

/// Counts from one `add_sample` step
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChainStepSummary {
    pub matched: usize,
    pub only_prev: usize,
    pub only_new: usize,
    pub genes: usize,
}

fn load_records(gff: &Path, groups: &GroupTable, group_path: &Path) -> Result<Vec<CollapsedRecord>> {
    let mut records = read_collapsed_gff(gff)?;
    check_unique_ids(&records, gff)?;
    for r in &records {
        if !groups.contains_key(&r.id) {
            return Err(Error::MissingId {
                id: r.id.clone(),
                context: gff.display().to_string(),
                path: group_path.to_path_buf(),
            });
        }
    }
    records.sort_by(|a, b| compare_ids(&a.id, &b.id));
    Ok(records)
}

/// Which parents a merged entry has: (accumulated index, new-sample index)
#[derive(Debug, Clone, Copy)]
enum Pairing {
    Both(usize, usize),
    Prev(usize),
    New(usize),
}

impl Pairing {
    fn indices(&self) -> (Option<usize>, Option<usize>) {
        match *self {
            Pairing::Both(i, j) => (Some(i), Some(j)),
            Pairing::Prev(i) => (Some(i), None),
            Pairing::New(j) => (None, Some(j)),
        }
    }
}

/// The collapsed set accumulated so far
pub struct MegaTree {
    prefix: String,
    records: Vec<CollapsedRecord>,
    groups: GroupTable,
    policy: MergePolicy,
}

impl MegaTree {
    /// Start a chain from the first sample; its members become `sample|member`
    pub fn from_sample<P: AsRef<Path>, Q: AsRef<Path>>(
        gff: P,
        group: Q,
        sample: &str,
        policy: MergePolicy,
    ) -> Result<Self> {
        let groups = read_groups_with_prefix(group.as_ref(), sample)?;
        let records = load_records(gff.as_ref(), &groups, group.as_ref())?;
        Ok(MegaTree {
            prefix: sample.to_string(),
            records,
            groups,
            policy,
        })
    }

    /// Reload the output of a previous step; members are already prefixed
    pub fn from_step(files: &ChainStepFiles, policy: MergePolicy) -> Result<Self> {
        let groups = read_groups(&files.group)?;
        let records = load_records(&files.gff, &groups, &files.group)?;
        Ok(MegaTree {
            prefix: files.prefix.clone(),
            records,
            groups,
            policy,
        })
    }

    /// First accumulated record (id order) the new record merges with
    fn find_match(&self, buckets: &BTreeMap<(&str, Strand), Vec<usize>>, record: &CollapsedRecord) -> Option<usize> {
        buckets
            .get(&(record.ref_id.as_str(), record.strand))?
            .iter()
            .copied()
            .find(|&i| {
                let prev = &self.records[i];
                prev.exons.overlaps(&record.exons)
                    && can_merge(&prev.exons, &record.exons, record.strand, &self.policy)
            })
    }

    /// Merge the collapsed set of `sample` into this one and write the step's
    /// GFF, group and mega_info files.
    pub fn add_sample<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        gff: P,
        group: Q,
        sample: &str,
        out: &ChainStepFiles,
    ) -> Result<ChainStepSummary> {
        let new_groups = read_groups_with_prefix(group.as_ref(), sample)?;
        let new_records = load_records(gff.as_ref(), &new_groups, group.as_ref())?;

        let mut buckets: BTreeMap<(&str, Strand), Vec<usize>> = BTreeMap::new();
        for (i, r) in self.records.iter().enumerate() {
            buckets.entry((r.ref_id.as_str(), r.strand)).or_default().push(i);
        }

        let mut summary = ChainStepSummary::default();
        let mut prev_used = vec![false; self.records.len()];
        let mut combined: Vec<Pairing> = Vec::new();
        for (j, r) in new_records.iter().enumerate() {
            match self.find_match(&buckets, r) {
                Some(i) => {
                    prev_used[i] = true;
                    combined.push(Pairing::Both(i, j));
                    summary.matched += 1;
                }
                None => {
                    combined.push(Pairing::New(j));
                    summary.only_new += 1;
                }
            }
        }
        for (i, used) in prev_used.iter().enumerate() {
            if !used {
                combined.push(Pairing::Prev(i));
                summary.only_prev += 1;
            }
        }

        // each entry is placed by the longer of its two records, the new one on ties
        let placed: Vec<&CollapsedRecord> = combined
            .iter()
            .map(|pairing| match *pairing {
                Pairing::Both(i, j) if self.records[i].exons.span_len() > new_records[j].exons.span_len() => {
                    &self.records[i]
                }
                Pairing::Both(_, j) | Pairing::New(j) => &new_records[j],
                Pairing::Prev(i) => &self.records[i],
            })
            .collect();

        let mut by_strand: BTreeMap<(&str, Strand), Vec<usize>> = BTreeMap::new();
        for (k, r) in placed.iter().enumerate() {
            by_strand.entry((r.ref_id.as_str(), r.strand)).or_default().push(k);
        }

        let mut gff_out = GffWriter::new(AtomicOutput::create(&out.gff)?);
        let mut group_out = GroupWriter::new(AtomicOutput::create(&out.group)?);
        let mut info_out = MegaInfoWriter::new(AtomicOutput::create(&out.mega_info)?, &self.prefix, sample)
            .map_err(|e| Error::io(e, &out.mega_info))?;

        for (_, mut entries) in by_strand {
            entries.sort_by_key(|&k| (placed[k].start(), placed[k].end(), k));
            let mut locus_end = 0;
            let mut isoform = 0;
            for k in entries {
                let record = placed[k];
                if isoform == 0 || record.start() >= locus_end {
                    summary.genes += 1;
                    isoform = 0;
                    locus_end = 0;
                }
                isoform += 1;
                locus_end = locus_end.max(record.end());

                let (i, j) = combined[k].indices();
                let prev_id = i.map(|i| self.records[i].id.clone());
                let new_id = j.map(|j| new_records[j].id.clone());
                let mut members = Vec::new();
                if let Some(id) = &prev_id {
                    members.extend(self.groups[id].iter().cloned());
                }
                if let Some(id) = &new_id {
                    members.extend(new_groups[id].iter().cloned());
                }

                let written = CollapsedRecord {
                    id: format!("PB.{}.{}", summary.genes, isoform),
                    support: members.len(),
                    ..record.clone()
                };
                gff_out
                    .write_record(&written)
                    .map_err(|e| Error::io(e, &out.gff))?;
                group_out
                    .write_group(&written.id, &members)
                    .map_err(|e| Error::io(e, &out.group))?;
                info_out
                    .write(&MergeGroupOperation {
                        pbid: written.id.clone(),
                        prev: prev_id,
                        sample: new_id,
                    })
                    .map_err(|e| Error::io(e, &out.mega_info))?;
                debug!("{} <- {} + {}", written.id, self.prefix, sample);
            }
        }

        gff_out.into_inner().commit()?;
        group_out.into_inner().commit()?;
        info_out.into_inner().commit()?;

        info!(
            "Added {} to {}: {} matched, {} only in {}, {} only in {}",
            sample, self.prefix, summary.matched, summary.only_prev, self.prefix, summary.only_new, sample
        );
        Ok(summary)
    }
}
