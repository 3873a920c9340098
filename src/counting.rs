//! Read-level status and per-isoform abundance from cluster read assignments.
use crate::abundance::{write_abundance, AbundanceRecord, AbundanceTotals};
use crate::error::{Error, Result};
use crate::group::{read_groups, GroupTable};
use crate::io_utils::{require_exists, AtomicOutput};
use indexmap::{IndexMap, IndexSet};
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads assigned to the clusters of one sample
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SampleAssignments {
    /// cluster id -> full-length reads
    pub fl_uc: IndexMap<String, Vec<String>>,
    /// cluster id -> non-full-length reads (a read may hit several clusters)
    pub nfl_partial_uc: IndexMap<String, Vec<String>>,
    /// non-full-length reads without a cluster
    pub nfl_nohit: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AssignmentDocument {
    #[serde(rename = "HQ")]
    hq: IndexMap<String, SampleAssignments>,
}

/// Parse the JSON assignment document, keyed by sample prefix without a
/// trailing `|`.
pub fn parse_assignments(text: &str, path: &Path) -> Result<IndexMap<String, SampleAssignments>> {
    let doc: AssignmentDocument = serde_json::from_str(text).map_err(|e| Error::Data {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(doc
        .hq
        .into_iter()
        .map(|(prefix, a)| (prefix.trim_end_matches('|').to_string(), a))
        .collect())
}

pub fn read_assignments<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, SampleAssignments>> {
    let path = path.as_ref();
    require_exists(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    parse_assignments(&text, path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStat {
    Unique,
    Ambiguous,
    Unassigned,
}

impl fmt::Display for ReadStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadStat::Unique => "unique",
            ReadStat::Ambiguous => "ambiguous",
            ReadStat::Unassigned => "unassigned",
        };
        write!(f, "{s}")
    }
}

/// One read-status row; ambiguous reads have one row per pbid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStatus {
    pub read_id: String,
    pub is_fl: bool,
    pub stat: ReadStat,
    pub pbid: Option<String>,
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.read_id,
            if self.is_fl { "Y" } else { "N" },
            self.stat,
            self.pbid.as_deref().unwrap_or("NA")
        )
    }
}

/// `(prefix, cluster id)` of a group member `prefix|cid/...`
pub fn member_cluster(member: &str) -> (&str, &str) {
    let (prefix, rest) = member.split_once('|').unwrap_or(("", member));
    let cid = rest.split('/').next().unwrap_or(rest);
    (prefix, cid)
}

/// Map `(prefix, cid)` to the pbid whose group lists it
fn cluster_index(groups: &GroupTable) -> Result<HashMap<(String, String), String>> {
    let mut index = HashMap::new();
    for (pbid, members) in groups {
        for m in members {
            let (prefix, cid) = member_cluster(m);
            let key = (prefix.to_string(), cid.to_string());
            if let Some(other) = index.insert(key, pbid.clone()) {
                if other != *pbid {
                    return Err(Error::DataConsistency(format!(
                        "cluster {m} belongs to both {other} and {pbid}"
                    )));
                }
            }
        }
    }
    Ok(index)
}

/// Status of every read in `assignments` against the clusters of `groups`
pub fn read_statuses(
    groups: &GroupTable,
    assignments: &IndexMap<String, SampleAssignments>,
) -> Result<Vec<ReadStatus>> {
    let index = cluster_index(groups)?;
    let lookup = |prefix: &str, cid: &str| index.get(&(prefix.to_string(), cid.to_string())).cloned();
    let mut statuses = Vec::new();

    for (prefix, sample) in assignments {
        let mut fl_seen = IndexSet::new();
        for (cid, reads) in &sample.fl_uc {
            let pbid = lookup(prefix, cid);
            for read in reads {
                if !fl_seen.insert(read.as_str()) {
                    return Err(Error::DataConsistency(format!(
                        "FL read {read} is assigned to more than one cluster in {prefix}"
                    )));
                }
                statuses.push(ReadStatus {
                    read_id: read.clone(),
                    is_fl: true,
                    stat: if pbid.is_some() { ReadStat::Unique } else { ReadStat::Unassigned },
                    pbid: pbid.clone(),
                });
            }
        }

        let mut nfl_hits: IndexMap<&str, IndexSet<String>> = IndexMap::new();
        for (cid, reads) in &sample.nfl_partial_uc {
            let pbid = lookup(prefix, cid);
            for read in reads {
                let hits = nfl_hits.entry(read.as_str()).or_default();
                if let Some(pbid) = &pbid {
                    hits.insert(pbid.clone());
                }
            }
        }
        for read in &sample.nfl_nohit {
            nfl_hits.entry(read.as_str()).or_default();
        }

        for (read, hits) in nfl_hits {
            match hits.len() {
                0 => statuses.push(ReadStatus {
                    read_id: read.to_string(),
                    is_fl: false,
                    stat: ReadStat::Unassigned,
                    pbid: None,
                }),
                1 => statuses.push(ReadStatus {
                    read_id: read.to_string(),
                    is_fl: false,
                    stat: ReadStat::Unique,
                    pbid: hits.into_iter().next(),
                }),
                _ => statuses.extend(hits.into_iter().map(|pbid| ReadStatus {
                    read_id: read.to_string(),
                    is_fl: false,
                    stat: ReadStat::Ambiguous,
                    pbid: Some(pbid),
                })),
            }
        }
    }
    Ok(statuses)
}

/// Abundance of every pbid in `groups` (file order) from read statuses
pub fn tally_abundance(groups: &GroupTable, statuses: &[ReadStatus]) -> (Vec<AbundanceRecord>, AbundanceTotals) {
    let mut fl: HashMap<&str, u64> = HashMap::new();
    let mut nfl: HashMap<&str, u64> = HashMap::new();
    let mut amb: HashMap<&str, f64> = HashMap::new();

    let mut ambiguous_hits: IndexMap<&str, Vec<&str>> = IndexMap::new();
    let mut fl_reads = IndexSet::new();
    let mut nfl_reads = IndexSet::new();
    let mut nfl_unique = 0u64;

    for s in statuses {
        if s.is_fl {
            fl_reads.insert(s.read_id.as_str());
        } else {
            nfl_reads.insert(s.read_id.as_str());
        }
        match (s.stat, &s.pbid) {
            (ReadStat::Unique, Some(pbid)) if s.is_fl => *fl.entry(pbid).or_default() += 1,
            (ReadStat::Unique, Some(pbid)) => {
                *nfl.entry(pbid).or_default() += 1;
                nfl_unique += 1;
            }
            (ReadStat::Ambiguous, Some(pbid)) => ambiguous_hits.entry(s.read_id.as_str()).or_default().push(pbid),
            _ => {}
        }
    }
    for hits in ambiguous_hits.values() {
        let weight = 1.0 / hits.len() as f64;
        for pbid in hits {
            *amb.entry(pbid).or_default() += weight;
        }
    }

    let totals = AbundanceTotals {
        fl: fl_reads.len() as u64,
        fl_unique_nfl: fl_reads.len() as u64 + nfl_unique,
        all: (fl_reads.len() + nfl_reads.len()) as u64,
    };
    let ratio = |count: f64, total: u64| if total == 0 { 0.0 } else { count / total as f64 };

    let records = groups
        .keys()
        .map(|pbid| {
            let count_fl = fl.get(pbid.as_str()).copied().unwrap_or(0);
            let count_nfl = count_fl + nfl.get(pbid.as_str()).copied().unwrap_or(0);
            let count_nfl_amb = count_nfl as f64 + amb.get(pbid.as_str()).copied().unwrap_or(0.0);
            AbundanceRecord {
                pbid: pbid.clone(),
                count_fl,
                count_nfl,
                count_nfl_amb,
                norm_fl: ratio(count_fl as f64, totals.fl),
                norm_nfl: ratio(count_nfl as f64, totals.fl_unique_nfl),
                norm_nfl_amb: ratio(count_nfl_amb, totals.all),
            }
        })
        .collect();
    (records, totals)
}

/// Counts reported by a count run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSummary {
    pub pbids: usize,
    pub totals: AbundanceTotals,
}

/// Writes read status and abundance files for one collapsed sample
pub struct CountRunner {
    group: PathBuf,
    assignments: PathBuf,
    read_stat: PathBuf,
    abundance: PathBuf,
}

impl CountRunner {
    pub fn new(
        group: impl Into<PathBuf>,
        assignments: impl Into<PathBuf>,
        read_stat: impl Into<PathBuf>,
        abundance: impl Into<PathBuf>,
    ) -> Self {
        CountRunner {
            group: group.into(),
            assignments: assignments.into(),
            read_stat: read_stat.into(),
            abundance: abundance.into(),
        }
    }

    /// Output names `<prefix>.read_stat.txt` and `<prefix>.abundance.txt`
    pub fn with_prefix(group: impl Into<PathBuf>, assignments: impl Into<PathBuf>, prefix: &str) -> Self {
        Self::new(
            group,
            assignments,
            format!("{prefix}.read_stat.txt"),
            format!("{prefix}.abundance.txt"),
        )
    }

    pub fn validate_inputs(&self) -> Result<()> {
        require_exists(&self.group)?;
        require_exists(&self.assignments)
    }

    pub fn run(&self) -> Result<CountSummary> {
        self.validate_inputs()?;
        let groups = read_groups(&self.group)?;
        let assignments = read_assignments(&self.assignments)?;
        let statuses = read_statuses(&groups, &assignments)?;

        let mut stat_out = AtomicOutput::create(&self.read_stat)?;
        writeln!(stat_out, "id\tis_fl\tstat\tpbid").map_err(|e| Error::io(e, &self.read_stat))?;
        for s in &statuses {
            writeln!(stat_out, "{s}").map_err(|e| Error::io(e, &self.read_stat))?;
        }

        let (records, totals) = tally_abundance(&groups, &statuses);
        let mut abundance_out = AtomicOutput::create(&self.abundance)?;
        write_abundance(&mut abundance_out, &records, &totals).map_err(|e| Error::io(e, &self.abundance))?;

        stat_out.commit()?;
        abundance_out.commit()?;
        info!(
            "Counted {} FL and {} total reads over {} isoforms; abundance in {}",
            totals.fl,
            totals.all,
            records.len(),
            self.abundance.display()
        );
        Ok(CountSummary {
            pbids: records.len(),
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"HQ": {"s1|": {
        "fl_uc": {"c1": ["r1", "r2"], "c2": ["r3"], "c9": ["r4"]},
        "nfl_partial_uc": {"c1": ["n1", "n2"], "c2": ["n2", "n3"]},
        "nfl_nohit": ["n4"]
    }}}"#;

    fn groups() -> GroupTable {
        let mut g = GroupTable::new();
        g.insert("PB.1.1".to_string(), vec!["s1|c1/f2p0/1000".to_string()]);
        g.insert("PB.1.2".to_string(), vec!["s1|c2/f1p0/900".to_string()]);
        g
    }

    #[test]
    fn test_member_cluster() {
        assert_eq!(member_cluster("s1|c12/f3p0/1200"), ("s1", "c12"));
        assert_eq!(member_cluster("c12/f3p0/1200"), ("", "c12"));
    }

    #[test]
    fn test_read_statuses() {
        let assignments = parse_assignments(DOC, Path::new("a.json")).unwrap();
        assert!(assignments.contains_key("s1"));
        let statuses = read_statuses(&groups(), &assignments).unwrap();
        let rendered: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "r1\tY\tunique\tPB.1.1",
                "r2\tY\tunique\tPB.1.1",
                "r3\tY\tunique\tPB.1.2",
                "r4\tY\tunassigned\tNA",
                "n1\tN\tunique\tPB.1.1",
                "n2\tN\tambiguous\tPB.1.1",
                "n2\tN\tambiguous\tPB.1.2",
                "n3\tN\tunique\tPB.1.2",
                "n4\tN\tunassigned\tNA",
            ]
        );
    }

    #[test]
    fn test_tally_abundance() {
        let assignments = parse_assignments(DOC, Path::new("a.json")).unwrap();
        let statuses = read_statuses(&groups(), &assignments).unwrap();
        let (records, totals) = tally_abundance(&groups(), &statuses);

        assert_eq!(totals, AbundanceTotals { fl: 4, fl_unique_nfl: 6, all: 8 });
        assert_eq!(records[0].count_fl, 2);
        assert_eq!(records[0].count_nfl, 3);
        assert!((records[0].count_nfl_amb - 3.5).abs() < 1e-9);
        assert!((records[0].norm_fl - 0.5).abs() < 1e-9);
        assert!((records[0].norm_nfl - 0.5).abs() < 1e-9);
        assert!((records[1].norm_nfl_amb - 2.5 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_key_is_data_error() {
        let err = parse_assignments(r#"{"HQ": {"s1": {"fl_uc": {}}}}"#, Path::new("a.json")).unwrap_err();
        match err {
            Error::Data { message, .. } => assert!(message.contains("nfl_partial_uc")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
