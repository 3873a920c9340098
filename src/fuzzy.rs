//! Second-generation merge of collapsed records whose junctions agree within
//! a tolerance.
use crate::error::{Error, Result};
use crate::exon_chain::{can_merge, MergePolicy, Strand};
use crate::gff::{check_unique_ids, compare_ids, read_collapsed_gff, CollapsedRecord, GffWriter};
use crate::group::{read_groups, GroupTable, GroupWriter};
use crate::io_utils::AtomicOutput;
use crate::union_find::UnionFind;
use log::info;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A fuzzy cluster: the record kept for it and the merged group
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyCluster {
    pub record: CollapsedRecord,
    pub members: Vec<String>,
    /// Ids of the collapsed records that were merged, in id order
    pub merged_ids: Vec<String>,
}

/// Merge `records` under `policy`. Every record must have a group in `groups`.
pub fn merge_fuzzy_junctions(
    records: &[CollapsedRecord],
    groups: &GroupTable,
    policy: &MergePolicy,
    group_path: &Path,
) -> Result<Vec<FuzzyCluster>> {
    for r in records {
        if !groups.contains_key(&r.id) {
            return Err(Error::MissingId {
                id: r.id.clone(),
                context: "collapsed GFF".to_string(),
                path: group_path.to_path_buf(),
            });
        }
    }

    let mut buckets: BTreeMap<(&str, Strand), Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        buckets.entry((r.ref_id.as_str(), r.strand)).or_default().push(i);
    }

    let mut uf = UnionFind::new(records.len());
    for ((_, strand), mut indices) in buckets {
        indices.sort_by_key(|&i| (records[i].start(), i));
        for (pos, &i) in indices.iter().enumerate() {
            for &j in &indices[pos + 1..] {
                if records[j].start() >= records[i].end() {
                    break;
                }
                if can_merge(&records[i].exons, &records[j].exons, strand, policy) {
                    uf.union(i, j);
                }
            }
        }
    }

    let mut clusters: Vec<FuzzyCluster> = uf
        .get_sets()
        .into_iter()
        .map(|mut set| {
            set.sort_by(|&a, &b| compare_ids(&records[a].id, &records[b].id));
            // most exons, then longest span; `set` is in id order so the first max wins ties
            let best = set
                .iter()
                .copied()
                .enumerate()
                .max_by_key(|&(pos, i)| {
                    let exons = &records[i].exons;
                    (exons.num_exons(), exons.span_len(), Reverse(pos))
                })
                .map_or(set[0], |(_, i)| i);
            let members: Vec<String> = set
                .iter()
                .flat_map(|&i| groups.get(&records[i].id).into_iter().flatten().cloned())
                .collect();
            FuzzyCluster {
                record: CollapsedRecord {
                    support: members.len(),
                    ..records[best].clone()
                },
                members,
                merged_ids: set.iter().map(|&i| records[i].id.clone()).collect(),
            }
        })
        .collect();

    clusters.sort_by(|a, b| compare_ids(&a.record.id, &b.record.id));
    Ok(clusters)
}

/// Counts from one fuzzy-merge run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FuzzySummary {
    pub input_records: usize,
    pub output_records: usize,
    pub carried_groups: usize,
}

/// Merge the good records of `gff_in` and write the new generation.
///
/// Groups in `group_in` that belong to no good record (bad clusters) are
/// copied to `group_out` unchanged after the merged groups.
pub fn collapse_fuzzy_junctions<P1, P2, P3, P4>(
    gff_in: P1,
    group_in: P2,
    gff_out: P3,
    group_out: P4,
    policy: &MergePolicy,
) -> Result<FuzzySummary>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>,
    P3: AsRef<Path>,
    P4: AsRef<Path>,
{
    let records = read_collapsed_gff(gff_in.as_ref())?;
    check_unique_ids(&records, gff_in.as_ref())?;
    let groups = read_groups(group_in.as_ref())?;

    let clusters = merge_fuzzy_junctions(&records, &groups, policy, group_in.as_ref())?;

    let mut gff = GffWriter::new(AtomicOutput::create(gff_out.as_ref())?);
    let mut group_writer = GroupWriter::new(AtomicOutput::create(group_out.as_ref())?);
    for cluster in &clusters {
        gff.write_record(&cluster.record)
            .map_err(|e| Error::io(e, gff_out.as_ref()))?;
        group_writer
            .write_group(&cluster.record.id, &cluster.members)
            .map_err(|e| Error::io(e, group_out.as_ref()))?;
    }

    let good_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let mut carried = 0;
    for (id, members) in &groups {
        if !good_ids.contains(id.as_str()) {
            group_writer
                .write_group(id, members)
                .map_err(|e| Error::io(e, group_out.as_ref()))?;
            carried += 1;
        }
    }

    gff.into_inner().commit()?;
    group_writer.into_inner().commit()?;

    info!(
        "Fuzzy junction merge (tolerance {}): {} -> {} records",
        policy.tolerance,
        records.len(),
        clusters.len()
    );
    Ok(FuzzySummary {
        input_records: records.len(),
        output_records: clusters.len(),
        carried_groups: carried,
    })
}

/// Largest junction coordinate difference between two chains with the same
/// number of exons, `None` otherwise.
pub fn max_junction_shift(a: &CollapsedRecord, b: &CollapsedRecord) -> Option<u64> {
    if a.exons.num_exons() != b.exons.num_exons() {
        return None;
    }
    a.exons
        .junctions()
        .iter()
        .zip(b.exons.junctions().iter())
        .map(|(x, y)| x.0.abs_diff(y.0).max(x.1.abs_diff(y.1)))
        .max()
        .or(Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exon_chain::{ExonChain, Interval};

    fn record(id: &str, exons: &[(u64, u64)]) -> CollapsedRecord {
        CollapsedRecord {
            id: id.to_string(),
            ref_id: "chr1".to_string(),
            strand: Strand::Forward,
            exons: ExonChain::new(exons.iter().map(|&(s, e)| Interval::new(s, e)).collect()).unwrap(),
            support: 1,
        }
    }

    fn groups(entries: &[(&str, &[&str])]) -> GroupTable {
        entries
            .iter()
            .map(|(id, members)| (id.to_string(), members.iter().map(|m| m.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_fuzzy_merge_keeps_best_constituent() {
        let records = vec![
            record("PB.1.1", &[(100, 200), (300, 400)]),
            record("PB.1.2", &[(100, 203), (298, 400)]),
            record("PB.1.3", &[(100, 250), (300, 400)]),
        ];
        let table = groups(&[("PB.1.1", &["a"]), ("PB.1.2", &["b", "c"]), ("PB.1.3", &["d"])]);
        let policy = MergePolicy::exact().with_tolerance(5);
        let clusters = merge_fuzzy_junctions(&records, &table, &policy, Path::new("g.txt")).unwrap();

        assert_eq!(clusters.len(), 2);
        // equal exon counts and spans: the earlier id wins
        assert_eq!(clusters[0].record.id, "PB.1.1");
        assert_eq!(clusters[0].record.support, 3);
        assert_eq!(clusters[0].members, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].merged_ids, vec!["PB.1.1", "PB.1.2"]);
        assert_eq!(clusters[1].record.id, "PB.1.3");
        assert!(max_junction_shift(&records[0], &records[1]).unwrap() <= 5);
    }

    #[test]
    fn test_longer_span_wins_over_larger_group() {
        let records = vec![
            record("PB.1.1", &[(0, 200), (300, 1000)]),
            record("PB.1.2", &[(150, 200), (300, 450)]),
        ];
        let table = groups(&[("PB.1.1", &["a"]), ("PB.1.2", &["b", "c"])]);
        let clusters = merge_fuzzy_junctions(&records, &table, &MergePolicy::exact(), Path::new("g.txt")).unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].record.id, "PB.1.1");
        assert_eq!((clusters[0].record.start(), clusters[0].record.end()), (0, 1000));
        assert_eq!(clusters[0].record.support, clusters[0].members.len());
    }

    #[test]
    fn test_zero_tolerance_is_identity_on_distinct_chains() {
        let records = vec![
            record("PB.1.1", &[(100, 200), (300, 400)]),
            record("PB.1.2", &[(100, 203), (298, 400)]),
        ];
        let table = groups(&[("PB.1.1", &["a"]), ("PB.1.2", &["b"])]);
        let clusters = merge_fuzzy_junctions(&records, &table, &MergePolicy::exact(), Path::new("g.txt")).unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_missing_group_is_error() {
        let records = vec![record("PB.1.1", &[(100, 200)])];
        let err = merge_fuzzy_junctions(&records, &GroupTable::new(), &MergePolicy::exact(), Path::new("g.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingId { .. }));
    }
}
