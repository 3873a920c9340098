//! Exact-junction collapsing of one locus+strand group into clusters.
use crate::error::Result;
use crate::exon_chain::{can_merge, MergePolicy, Strand};
use crate::gff::{CollapsedRecord, GffWriter};
use crate::group::GroupWriter;
use crate::locus::{AlignmentThresholds, LocusGrouper};
use crate::sam::{AlignmentRecord, SamEntry};
use crate::union_find::UnionFind;
use log::{debug, info};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::io::Write;

/// Collapse stage configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseConfig {
    pub min_aln_coverage: f64,
    pub min_aln_identity: f64,
    pub min_support: usize,
    pub max_fuzzy_junction: u64,
    pub allow_extra_5exon: bool,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        CollapseConfig {
            min_aln_coverage: 0.99,
            min_aln_identity: 0.95,
            min_support: 1,
            max_fuzzy_junction: 5,
            allow_extra_5exon: false,
        }
    }
}

impl CollapseConfig {
    pub fn thresholds(&self) -> AlignmentThresholds {
        AlignmentThresholds {
            min_aln_coverage: self.min_aln_coverage,
            min_aln_identity: self.min_aln_identity,
        }
    }

    /// Policy for the exact branch stage
    pub fn branch_policy(&self) -> MergePolicy {
        MergePolicy::exact().with_extra_5exon(self.allow_extra_5exon)
    }

    /// Policy for the fuzzy-junction stage
    pub fn fuzzy_policy(&self) -> MergePolicy {
        self.branch_policy().with_tolerance(self.max_fuzzy_junction)
    }

    /// Arguments as a single line for logs
    pub fn arg_str(&self) -> String {
        format!(
            "min_aln_coverage={} min_aln_identity={} min_support={} max_fuzzy_junction={} allow_extra_5exon={}",
            self.min_aln_coverage,
            self.min_aln_identity,
            self.min_support,
            self.max_fuzzy_junction,
            self.allow_extra_5exon
        )
    }
}

/// One collapsed cluster and the raw ids it absorbed
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub record: CollapsedRecord,
    pub members: Vec<String>,
    pub good: bool,
}

/// Collapse the records of one locus+strand group, naming clusters
/// `PB.<gene_index>.<n>`. Records must be in input order.
pub fn collapse_group(
    records: &[AlignmentRecord],
    strand: Strand,
    gene_index: usize,
    policy: &MergePolicy,
    min_support: usize,
) -> Vec<Cluster> {
    let mut uf = UnionFind::new(records.len());
    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            if !records[i].exons.overlaps(&records[j].exons) {
                continue;
            }
            if can_merge(&records[i].exons, &records[j].exons, strand, policy) {
                uf.union(i, j);
            }
        }
    }

    let mut sets = uf.get_sets();
    // leftmost start first, then earliest input (sets are keyed by their first index)
    sets.sort_by_key(|set| {
        let start = set.iter().map(|&i| records[i].start()).min().unwrap_or(0);
        (start, set[0])
    });

    sets.into_iter()
        .enumerate()
        .map(|(isoform, set)| {
            let best = set
                .iter()
                .copied()
                .max_by_key(|&i| (records[i].exons.num_exons(), records[i].exons.span_len(), Reverse(i)))
                .unwrap_or(set[0]);
            let start = set.iter().map(|&i| records[i].start()).min().unwrap_or(0);
            let end = set.iter().map(|&i| records[i].end()).max().unwrap_or(0);

            let members: Vec<String> = set.iter().map(|&i| records[i].query_id.clone()).collect();
            let support = members.iter().collect::<HashSet<_>>().len();

            let record = CollapsedRecord {
                id: format!("PB.{}.{}", gene_index, isoform + 1),
                ref_id: records[best].ref_id.clone(),
                strand,
                exons: records[best].exons.with_bounds(start, end),
                support,
            };
            Cluster {
                record,
                members,
                good: support >= min_support,
            }
        })
        .collect()
}

/// Counts from one branch run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BranchSummary {
    pub loci: usize,
    pub genes: usize,
    pub good: usize,
    pub bad: usize,
}

/// Drives exact collapsing over a whole alignment stream
pub struct Branch {
    policy: MergePolicy,
    min_support: usize,
}

impl Branch {
    pub fn new(config: &CollapseConfig) -> Self {
        Branch {
            policy: config.branch_policy(),
            min_support: config.min_support,
        }
    }

    /// Collapse every locus from `grouper`, writing good and bad records and
    /// every cluster's group line.
    pub fn run<I, W1, W2, W3>(
        &self,
        grouper: &mut LocusGrouper<I>,
        good: &mut GffWriter<W1>,
        bad: &mut GffWriter<W2>,
        groups: &mut GroupWriter<W3>,
    ) -> Result<BranchSummary>
    where
        I: Iterator<Item = Result<SamEntry>>,
        W1: Write,
        W2: Write,
        W3: Write,
    {
        let mut summary = BranchSummary::default();
        for locus in grouper {
            let locus = locus?;
            summary.loci += 1;
            for (strand, records) in locus.strand_groups() {
                summary.genes += 1;
                let clusters = collapse_group(&records, strand, summary.genes, &self.policy, self.min_support);
                debug!(
                    "PB.{}: {} records on {} collapsed to {} clusters",
                    summary.genes,
                    records.len(),
                    strand,
                    clusters.len()
                );
                for cluster in &clusters {
                    if cluster.good {
                        good.write_record(&cluster.record)?;
                        summary.good += 1;
                    } else {
                        bad.write_record(&cluster.record)?;
                        summary.bad += 1;
                    }
                    groups.write_group(&cluster.record.id, &cluster.members)?;
                }
            }
        }
        info!(
            "Collapsed {} loci into {} good and {} bad clusters",
            summary.loci, summary.good, summary.bad
        );
        Ok(summary)
    }
}
