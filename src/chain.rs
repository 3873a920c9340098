//! Chain collapsed samples into one catalog and resolve every final id back
//! to its per-sample ids and abundances.
use crate::abundance::{AbundanceTable, METRICS};
use crate::chain_config::ChainConfig;
use crate::error::{Error, Result};
use crate::exon_chain::MergePolicy;
use crate::io_utils::{copy_file, format_sci, AtomicOutput};
use crate::mega_info::{MegaInfoTable, NA};
use crate::mega_tree::{ChainStepFiles, MegaTree};
use indexmap::IndexMap;
use log::{info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHAINED_IDS: &str = "all_samples.chained_ids.txt";
pub const CHAINED_COUNT: &str = "all_samples.chained_count.txt";
pub const CHAINED_GFF: &str = "all_samples.chained.gff";

/// Per-sample ids of one final chained id, `None` where the sample lacks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub pbid: String,
    pub ids: Vec<Option<String>>,
}

/// Walks mega_info tables backward from the last step
pub struct ChainResolver {
    samples: Vec<String>,
    /// Table of step `k` adds sample `k + 1`
    steps: Vec<MegaInfoTable>,
}

impl ChainResolver {
    /// `steps[k]` must be the mega_info written when `samples[k + 1]` was added
    pub fn new(samples: Vec<String>, steps: Vec<MegaInfoTable>) -> Result<Self> {
        if samples.len() < 2 || steps.len() != samples.len() - 1 {
            return Err(Error::Config(format!(
                "{} samples need {} chaining steps, found {}",
                samples.len(),
                samples.len().saturating_sub(1),
                steps.len()
            )));
        }
        Ok(ChainResolver { samples, steps })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    fn resolve_row(&self, pbid: &str) -> Result<ResolvedRow> {
        let n = self.samples.len();
        let mut ids: Vec<Option<String>> = vec![None; n];
        let last = &self.steps[n - 2];
        let mut row = last.get(pbid).ok_or_else(|| {
            Error::DataConsistency(format!("{} not found in {}", pbid, last.path.display()))
        })?;
        ids[n - 1] = row.sample.clone();

        // samples n-2 .. 1 come from the step tables, sample 0 from the first step's prev column
        for k in (1..n - 1).rev() {
            let Some(prev) = &row.prev else {
                return Ok(ResolvedRow {
                    pbid: pbid.to_string(),
                    ids,
                });
            };
            let table = &self.steps[k - 1];
            row = table.get(prev).ok_or_else(|| {
                Error::DataConsistency(format!(
                    "{} (parent of {} in step {}) not found in {}",
                    prev,
                    pbid,
                    self.samples[k + 1],
                    table.path.display()
                ))
            })?;
            ids[k] = row.sample.clone();
        }
        ids[0] = row.prev.clone();

        Ok(ResolvedRow {
            pbid: pbid.to_string(),
            ids,
        })
    }

    /// One row per final id in the order of the last mega_info table
    pub fn resolve(&self) -> Result<Vec<ResolvedRow>> {
        let last = &self.steps[self.steps.len() - 1];
        last.rows.keys().map(|pbid| self.resolve_row(pbid)).collect()
    }
}

/// Look up `metric` for every resolved id
pub fn resolve_abundances(
    rows: &[ResolvedRow],
    samples: &[String],
    tables: &[IndexMap<String, f64>],
) -> Result<Vec<Vec<Option<f64>>>> {
    rows.iter()
        .map(|row| {
            row.ids
                .iter()
                .enumerate()
                .map(|(s, id)| match id {
                    None => Ok(None),
                    Some(id) => tables[s].get(id).copied().map(Some).ok_or_else(|| {
                        Error::DataConsistency(format!(
                            "{} ({} of sample {}) has no abundance",
                            id, row.pbid, samples[s]
                        ))
                    }),
                })
                .collect()
        })
        .collect()
}

/// Counts reported by a chain run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSummary {
    pub samples: usize,
    pub chained_ids: usize,
    pub output_dir: PathBuf,
}

/// Chain every sample of `config` in order and write the unified outputs to
/// `out_dir`.
pub fn chain_samples<P: AsRef<Path>>(
    config: &ChainConfig,
    metric: &str,
    policy: MergePolicy,
    out_dir: P,
) -> Result<ChainSummary> {
    let out_dir = out_dir.as_ref();
    if config.samples.len() < 2 {
        return Err(Error::Config("chaining needs at least two samples".to_string()));
    }
    if !METRICS.contains(&metric) {
        warn!("{metric} is not a standard abundance column; looking it up anyway");
    }
    for sample in &config.samples {
        sample.require_exists()?;
    }

    let abundances = config
        .samples
        .iter()
        .map(|s| AbundanceTable::read(&s.abundance)?.metric(metric))
        .collect::<Result<Vec<_>>>()?;

    let first = &config.samples[0];
    let mut tree = MegaTree::from_sample(&first.gff, &first.group, &first.name, policy)?;
    let mut step_files = Vec::new();
    for sample in &config.samples[1..] {
        let files = ChainStepFiles::for_sample(out_dir, &sample.name);
        tree.add_sample(&sample.gff, &sample.group, &sample.name, &files)?;
        tree = MegaTree::from_step(&files, policy)?;
        step_files.push(files);
    }

    let steps = step_files
        .iter()
        .map(|f| MegaInfoTable::read(&f.mega_info))
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = config.sample_names().into_iter().map(str::to_string).collect();
    let resolver = ChainResolver::new(names.clone(), steps)?;
    let rows = resolver.resolve()?;
    let values = resolve_abundances(&rows, &names, &abundances)?;

    let ids_path = out_dir.join(CHAINED_IDS);
    let count_path = out_dir.join(CHAINED_COUNT);
    let mut ids_out = AtomicOutput::create(&ids_path)?;
    let mut count_out = AtomicOutput::create(&count_path)?;
    write_chained(&mut ids_out, &mut count_out, &names, &rows, &values)
        .map_err(|e| Error::io(e, &ids_path))?;
    ids_out.commit()?;
    count_out.commit()?;

    if let Some(last) = step_files.last() {
        copy_file(&last.gff, out_dir.join(CHAINED_GFF))?;
    }

    info!(
        "Chained {} samples into {} ids ({})",
        names.len(),
        rows.len(),
        out_dir.join(CHAINED_IDS).display()
    );
    Ok(ChainSummary {
        samples: names.len(),
        chained_ids: rows.len(),
        output_dir: out_dir.to_path_buf(),
    })
}

fn write_chained<W1: Write, W2: Write>(
    ids_out: &mut W1,
    count_out: &mut W2,
    samples: &[String],
    rows: &[ResolvedRow],
    values: &[Vec<Option<f64>>],
) -> std::io::Result<()> {
    let header = format!("superPBID\t{}", samples.join("\t"));
    writeln!(ids_out, "{header}")?;
    writeln!(count_out, "{header}")?;
    for (row, vals) in rows.iter().zip(values) {
        let ids: Vec<&str> = row.ids.iter().map(|id| id.as_deref().unwrap_or(NA)).collect();
        writeln!(ids_out, "{}\t{}", row.pbid, ids.join("\t"))?;
        let counts: Vec<String> = vals
            .iter()
            .map(|v| v.map_or_else(|| NA.to_string(), format_sci))
            .collect();
        writeln!(count_out, "{}\t{}", row.pbid, counts.join("\t"))?;
    }
    Ok(())
}

/// Read a chained ids file back as `superPBID -> per-sample ids`
pub fn read_chained_ids<P: AsRef<Path>>(path: P) -> Result<(Vec<String>, Vec<ResolvedRow>)> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    let mut lines = text.lines();
    let samples: Vec<String> = match lines.next().map(|l| l.split('\t').collect::<Vec<_>>()) {
        Some(cols) if cols.first() == Some(&"superPBID") => cols[1..].iter().map(|s| s.to_string()).collect(),
        _ => return Err(Error::parse(path, 1, "expected superPBID header")),
    };
    let mut seen = HashMap::new();
    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != samples.len() + 1 {
            return Err(Error::parse(path, idx + 2, "column count does not match header"));
        }
        if seen.insert(cols[0].to_string(), idx).is_some() {
            return Err(Error::DuplicateId {
                id: cols[0].to_string(),
                path: path.to_path_buf(),
            });
        }
        rows.push(ResolvedRow {
            pbid: cols[0].to_string(),
            ids: cols[1..].iter().map(|c| (*c != NA).then(|| c.to_string())).collect(),
        });
    }
    Ok((samples, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table(text: &str, name: &str) -> MegaInfoTable {
        MegaInfoTable::from_reader(Cursor::new(text.to_string()), Path::new(name)).unwrap()
    }

    #[test]
    fn test_na_parent_stops_the_walk() {
        let step_b = table("pbid\tA\tB\nPB.1.1\tPB.1.1\tPB.1.1\nPB.2.1\tNA\tPB.2.1\n", "tmp_B.mega_info.txt");
        let step_c = table(
            "pbid\ttmp_B\tC\nPB.1.1\tPB.1.1\tPB.1.3\nPB.2.1\tPB.2.1\tNA\nPB.3.1\tNA\tPB.7.1\n",
            "tmp_C.mega_info.txt",
        );
        let samples = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let resolver = ChainResolver::new(samples, vec![step_b, step_c]).unwrap();
        let rows = resolver.resolve().unwrap();

        let some = |s: &str| Some(s.to_string());
        assert_eq!(rows[0].ids, vec![some("PB.1.1"), some("PB.1.1"), some("PB.1.3")]);
        assert_eq!(rows[1].ids, vec![None, some("PB.2.1"), None]);
        assert_eq!(rows[2].ids, vec![None, None, some("PB.7.1")]);
    }

    #[test]
    fn test_missing_parent_row_is_consistency_error() {
        let step_b = table("pbid\tA\tB\nPB.1.1\tPB.1.1\tNA\n", "b");
        let step_c = table("pbid\ttmp_B\tC\nPB.1.1\tPB.9.9\tPB.1.1\n", "c");
        let samples = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let resolver = ChainResolver::new(samples, vec![step_b, step_c]).unwrap();
        assert!(matches!(resolver.resolve(), Err(Error::DataConsistency(_))));
    }

    #[test]
    fn test_abundance_lookup() {
        let rows = vec![ResolvedRow {
            pbid: "PB.1.1".to_string(),
            ids: vec![Some("PB.1.1".to_string()), None],
        }];
        let samples = vec!["A".to_string(), "B".to_string()];
        let tables: Vec<IndexMap<String, f64>> = vec![[("PB.1.1".to_string(), 0.25)].into_iter().collect(), IndexMap::new()];
        let values = resolve_abundances(&rows, &samples, &tables).unwrap();
        assert_eq!(values, vec![vec![Some(0.25), None]]);

        let empty = vec![IndexMap::new(), IndexMap::new()];
        assert!(matches!(
            resolve_abundances(&rows, &samples, &empty),
            Err(Error::DataConsistency(_))
        ));
    }
}
