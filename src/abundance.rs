use crate::error::{Error, Result};
use crate::io_utils::{format_sci, open_input};
use indexmap::IndexMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Metrics written by the counter, in column order
pub const METRICS: [&str; 6] = [
    "count_fl",
    "count_nfl",
    "count_nfl_amb",
    "norm_fl",
    "norm_nfl",
    "norm_nfl_amb",
];

pub const DEFAULT_METRIC: &str = "norm_nfl";

/// Abundance of one collapsed id
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceRecord {
    pub pbid: String,
    pub count_fl: u64,
    pub count_nfl: u64,
    pub count_nfl_amb: f64,
    pub norm_fl: f64,
    pub norm_nfl: f64,
    pub norm_nfl_amb: f64,
}

/// Read totals the normalized columns are divided by
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbundanceTotals {
    pub fl: u64,
    pub fl_unique_nfl: u64,
    pub all: u64,
}

/// Write the commented header, column header and one row per record
pub fn write_abundance<W: Write>(
    writer: &mut W,
    records: &[AbundanceRecord],
    totals: &AbundanceTotals,
) -> std::io::Result<()> {
    writeln!(writer, "#")?;
    writeln!(writer, "# -----------------")?;
    writeln!(writer, "# Field explanation")?;
    writeln!(writer, "# -----------------")?;
    writeln!(writer, "# count_fl: Number of associated FL reads")?;
    writeln!(writer, "# count_nfl: Number of associated FL + unique nFL reads")?;
    writeln!(
        writer,
        "# count_nfl_amb: Number of associated FL + unique nFL + weighted ambiguous nFL reads"
    )?;
    writeln!(writer, "# norm_fl: count_fl / total number of FL reads")?;
    writeln!(writer, "# norm_nfl: count_nfl / total number of FL + unique nFL reads")?;
    writeln!(writer, "# norm_nfl_amb: count_nfl_amb / total number of all reads")?;
    writeln!(writer, "# Total Number of FL reads: {}", totals.fl)?;
    writeln!(writer, "# Total Number of FL + unique nFL reads: {}", totals.fl_unique_nfl)?;
    writeln!(writer, "# Total Number of all reads: {}", totals.all)?;
    writeln!(writer, "#")?;
    writeln!(writer, "pbid\t{}", METRICS.join("\t"))?;
    for r in records {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.2}\t{}\t{}\t{}",
            r.pbid,
            r.count_fl,
            r.count_nfl,
            r.count_nfl_amb,
            format_sci(r.norm_fl),
            format_sci(r.norm_nfl),
            format_sci(r.norm_nfl_amb)
        )?;
    }
    Ok(())
}

/// A parsed abundance file: every numeric column by pbid
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: IndexMap<String, Vec<f64>>,
}

impl AbundanceTable {
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = IndexMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io(e, path))?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let Some(header) = &columns else {
                if fields[0] != "pbid" {
                    return Err(Error::parse(path, idx + 1, "expected header line starting with pbid"));
                }
                columns = Some(fields[1..].iter().map(|s| s.to_string()).collect());
                continue;
            };
            if fields.len() != header.len() + 1 {
                return Err(Error::parse(
                    path,
                    idx + 1,
                    format!("expected {} columns, found {}", header.len() + 1, fields.len()),
                ));
            }
            let values = fields[1..]
                .iter()
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|_| Error::parse(path, idx + 1, format!("invalid number '{v}'")))
                })
                .collect::<Result<Vec<_>>>()?;
            if rows.insert(fields[0].to_string(), values).is_some() {
                return Err(Error::DuplicateId {
                    id: fields[0].to_string(),
                    path: path.to_path_buf(),
                });
            }
        }

        let columns = columns.ok_or_else(|| Error::parse(path, 0, "no header line"))?;
        Ok(AbundanceTable {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(open_input(path)?, path)
    }

    /// One metric for every pbid
    pub fn metric(&self, name: &str) -> Result<IndexMap<String, f64>> {
        let col = self.columns.iter().position(|c| c == name).ok_or_else(|| {
            Error::DataConsistency(format!("{} has no {} column", self.path.display(), name))
        })?;
        Ok(self
            .rows
            .iter()
            .map(|(pbid, values)| (pbid.clone(), values[col]))
            .collect())
    }
}
